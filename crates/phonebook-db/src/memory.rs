//! In-memory store.
//!
//! All entities live in one [`State`] value behind an async mutex. A
//! transaction holds that mutex for its whole lifetime and works on a copy
//! of the state: `commit` writes the copy back, `rollback` drops it.
//! Get-or-create runs under the state lock, so it cannot race with itself
//! inside one process.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use phonebook_core::{PhonebookError, PhonebookResult};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::locale;
use crate::models::{Address, Country, Group, Invite, NewInvite, NewUser, PostalCode, Profile, User};
use crate::store::{PhonebookStore, StoreTransaction};

#[derive(Debug, Clone, Default)]
struct State {
    next_id: i64,
    users: BTreeMap<i64, User>,
    profiles: BTreeMap<i64, Profile>,
    addresses: BTreeMap<i64, Address>,
    countries: BTreeMap<i64, Country>,
    /// `(country_id, locale, name)`
    country_names: Vec<(i64, String, String)>,
    postal_codes: BTreeMap<i64, PostalCode>,
    groups: BTreeMap<i64, Group>,
    /// `(profile_id, group_id)`
    memberships: BTreeSet<(i64, i64)>,
    invites: BTreeMap<i64, Invite>,
}

fn not_found(what: &str, key: impl std::fmt::Display) -> PhonebookError {
    PhonebookError::DoesNotExist(format!("{what} {key}"))
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn group_by_name(&self, name: &str) -> Option<&Group> {
        self.groups.values().find(|g| g.name == name)
    }

    fn create_user(&mut self, user: NewUser) -> PhonebookResult<User> {
        if self.users.values().any(|u| u.unique_id == user.unique_id) {
            return Err(PhonebookError::IntegrityError(format!(
                "user with unique_id '{}' already exists",
                user.unique_id
            )));
        }

        let user_id = self.allocate_id();
        let user = User {
            id: user_id,
            unique_id: user.unique_id,
            username: user.username,
            email: user.email,
        };
        self.users.insert(user_id, user.clone());

        let profile_id = self.allocate_id();
        self.profiles.insert(
            profile_id,
            Profile {
                id: profile_id,
                user_id,
                ..Profile::default()
            },
        );

        let address_id = self.allocate_id();
        self.addresses.insert(
            address_id,
            Address {
                id: address_id,
                user_id,
                ..Address::default()
            },
        );

        Ok(user)
    }

    fn get_user(&self, id: i64) -> PhonebookResult<User> {
        self.users.get(&id).cloned().ok_or_else(|| not_found("user", id))
    }

    fn count_users_with_email(&self, email: &str) -> u64 {
        let n = self.users.values().filter(|u| u.email == email).count();
        u64::try_from(n).unwrap_or(u64::MAX)
    }

    fn get_profile(&self, user_id: i64) -> PhonebookResult<Profile> {
        self.profiles
            .values()
            .find(|p| p.user_id == user_id)
            .cloned()
            .ok_or_else(|| not_found("profile for user", user_id))
    }

    fn save_profile(&mut self, profile: &Profile) -> PhonebookResult<()> {
        let slot = self
            .profiles
            .get_mut(&profile.id)
            .ok_or_else(|| not_found("profile", profile.id))?;
        *slot = profile.clone();
        Ok(())
    }

    fn get_address(&self, user_id: i64) -> PhonebookResult<Address> {
        self.addresses
            .values()
            .find(|a| a.user_id == user_id)
            .cloned()
            .ok_or_else(|| not_found("address for user", user_id))
    }

    fn save_address(&mut self, address: &Address) -> PhonebookResult<()> {
        if let Some(country_id) = address.country_id {
            if !self.countries.contains_key(&country_id) {
                return Err(PhonebookError::IntegrityError(format!(
                    "address references missing country {country_id}"
                )));
            }
        }
        let slot = self
            .addresses
            .get_mut(&address.id)
            .ok_or_else(|| not_found("address", address.id))?;
        *slot = address.clone();
        Ok(())
    }

    fn create_country(&mut self, code: &str, name: &str) -> PhonebookResult<Country> {
        let code = code.to_lowercase();
        if self.countries.values().any(|c| c.code == code) {
            return Err(PhonebookError::IntegrityError(format!(
                "country '{code}' already exists"
            )));
        }
        let id = self.allocate_id();
        let country = Country {
            id,
            code,
            name: name.to_string(),
        };
        self.countries.insert(id, country.clone());
        Ok(country)
    }

    fn set_country_name(&mut self, country_id: i64, locale: &str, name: &str) -> PhonebookResult<()> {
        if !self.countries.contains_key(&country_id) {
            return Err(not_found("country", country_id));
        }
        let tag = locale::normalize(locale);
        self.country_names
            .retain(|(id, l, _)| !(*id == country_id && *l == tag));
        self.country_names.push((country_id, tag, name.to_string()));
        Ok(())
    }

    fn localized_countries(&self, locale: &str) -> Vec<(Country, String)> {
        let mut listing: Vec<(Country, String)> = self
            .countries
            .values()
            .map(|country| {
                let translations = self
                    .country_names
                    .iter()
                    .filter(|(id, _, _)| *id == country.id)
                    .map(|(_, tag, name)| (tag.as_str(), name.as_str()));
                let display = locale::pick_name(locale, translations, &country.name).to_string();
                (country.clone(), display)
            })
            .collect();
        locale::sort_choices(&mut listing);
        listing
    }

    fn get_or_create_postal_code(&mut self, code: &str) -> (PostalCode, bool) {
        if let Some(existing) = self.postal_codes.values().find(|p| p.code == code) {
            return (existing.clone(), false);
        }
        let id = self.allocate_id();
        let postal_code = PostalCode {
            id,
            code: code.to_string(),
        };
        self.postal_codes.insert(id, postal_code.clone());
        (postal_code, true)
    }

    fn create_group(&mut self, name: &str, system: bool) -> PhonebookResult<Group> {
        if self.group_by_name(name).is_some() {
            return Err(PhonebookError::IntegrityError(format!(
                "group '{name}' already exists"
            )));
        }
        let id = self.allocate_id();
        let group = Group {
            id,
            name: name.to_string(),
            system,
        };
        self.groups.insert(id, group.clone());
        Ok(group)
    }

    fn get_or_create_group(&mut self, name: &str) -> (Group, bool) {
        if let Some(existing) = self.group_by_name(name) {
            return (existing.clone(), false);
        }
        let id = self.allocate_id();
        let group = Group {
            id,
            name: name.to_string(),
            system: false,
        };
        self.groups.insert(id, group.clone());
        (group, true)
    }

    fn profile_groups(&self, profile_id: i64) -> Vec<Group> {
        let mut groups: Vec<Group> = self
            .memberships
            .iter()
            .filter(|(p, _)| *p == profile_id)
            .filter_map(|(_, g)| self.groups.get(g).cloned())
            .collect();
        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups
    }

    fn add_profile_groups(&mut self, profile_id: i64, group_ids: &[i64]) -> PhonebookResult<()> {
        if !self.profiles.contains_key(&profile_id) {
            return Err(not_found("profile", profile_id));
        }
        if let Some(missing) = group_ids.iter().find(|id| !self.groups.contains_key(id)) {
            return Err(not_found("group", missing));
        }
        for group_id in group_ids {
            self.memberships.insert((profile_id, *group_id));
        }
        Ok(())
    }

    fn remove_profile_groups(&mut self, profile_id: i64, group_ids: &[i64]) {
        for group_id in group_ids {
            self.memberships.remove(&(profile_id, *group_id));
        }
    }

    fn create_invite(&mut self, invite: NewInvite) -> PhonebookResult<Invite> {
        if self.invites.values().any(|i| i.code == invite.code) {
            return Err(PhonebookError::IntegrityError(format!(
                "invite code '{}' already used",
                invite.code
            )));
        }
        let id = self.allocate_id();
        let invite = Invite {
            id,
            inviter: invite.inviter,
            recipient: invite.recipient,
            redeemer: None,
            code: invite.code,
            redeemed: None,
            created: chrono::Utc::now(),
        };
        self.invites.insert(id, invite.clone());
        Ok(invite)
    }

    fn invites_for(&self, recipient: &str) -> Vec<Invite> {
        self.invites
            .values()
            .filter(|i| i.recipient == recipient)
            .cloned()
            .collect()
    }
}

/// A store that keeps everything in process memory.
///
/// # Examples
///
/// ```
/// use phonebook_db::{MemoryStore, PhonebookStore};
///
/// let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
/// rt.block_on(async {
///     let store = MemoryStore::new();
///     let (group, created) = store.get_or_create_group("rust").await.unwrap();
///     assert!(created);
///     assert!(!group.system);
/// });
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T + Send) -> T {
        let mut state = self.state.lock().await;
        f(&mut state)
    }

    async fn begin(&self) -> PhonebookResult<Box<dyn StoreTransaction>> {
        let committed = Arc::clone(&self.state).lock_owned().await;
        let working = Mutex::new(State::clone(&committed));
        Ok(Box::new(MemoryTransaction { committed, working }))
    }
}

/// A transaction on a [`MemoryStore`].
///
/// Holds the store's lock until it is committed, rolled back or dropped.
#[derive(Debug)]
pub struct MemoryTransaction {
    committed: OwnedMutexGuard<State>,
    working: Mutex<State>,
}

impl MemoryTransaction {
    async fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T + Send) -> T {
        let mut state = self.working.lock().await;
        f(&mut state)
    }

    #[allow(clippy::unused_async)]
    async fn begin(&self) -> PhonebookResult<Box<dyn StoreTransaction>> {
        Err(PhonebookError::OperationalError(
            "a transaction is already open".to_string(),
        ))
    }
}

macro_rules! memory_store_impl {
    ($ty:ty) => {
        #[async_trait]
        impl PhonebookStore for $ty {
            fn vendor(&self) -> &str {
                "memory"
            }

            async fn create_user(&self, user: NewUser) -> PhonebookResult<User> {
                self.with_state(|s| s.create_user(user)).await
            }

            async fn get_user(&self, id: i64) -> PhonebookResult<User> {
                self.with_state(|s| s.get_user(id)).await
            }

            async fn count_users_with_email(&self, email: &str) -> PhonebookResult<u64> {
                Ok(self.with_state(|s| s.count_users_with_email(email)).await)
            }

            async fn get_profile(&self, user_id: i64) -> PhonebookResult<Profile> {
                self.with_state(|s| s.get_profile(user_id)).await
            }

            async fn save_profile(&self, profile: &Profile) -> PhonebookResult<()> {
                self.with_state(|s| s.save_profile(profile)).await
            }

            async fn get_address(&self, user_id: i64) -> PhonebookResult<Address> {
                self.with_state(|s| s.get_address(user_id)).await
            }

            async fn save_address(&self, address: &Address) -> PhonebookResult<()> {
                self.with_state(|s| s.save_address(address)).await
            }

            async fn create_country(&self, code: &str, name: &str) -> PhonebookResult<Country> {
                self.with_state(|s| s.create_country(code, name)).await
            }

            async fn set_country_name(
                &self,
                country_id: i64,
                locale: &str,
                name: &str,
            ) -> PhonebookResult<()> {
                self.with_state(|s| s.set_country_name(country_id, locale, name))
                    .await
            }

            async fn get_country(&self, id: i64) -> PhonebookResult<Option<Country>> {
                Ok(self.with_state(|s| s.countries.get(&id).cloned()).await)
            }

            async fn localized_countries(
                &self,
                locale: &str,
            ) -> PhonebookResult<Vec<(Country, String)>> {
                Ok(self.with_state(|s| s.localized_countries(locale)).await)
            }

            async fn get_or_create_postal_code(
                &self,
                code: &str,
            ) -> PhonebookResult<(PostalCode, bool)> {
                Ok(self.with_state(|s| s.get_or_create_postal_code(code)).await)
            }

            async fn get_postal_code(&self, id: i64) -> PhonebookResult<Option<PostalCode>> {
                Ok(self.with_state(|s| s.postal_codes.get(&id).cloned()).await)
            }

            async fn create_group(&self, name: &str, system: bool) -> PhonebookResult<Group> {
                self.with_state(|s| s.create_group(name, system)).await
            }

            async fn get_or_create_group(&self, name: &str) -> PhonebookResult<(Group, bool)> {
                Ok(self.with_state(|s| s.get_or_create_group(name)).await)
            }

            async fn find_group(&self, name: &str) -> PhonebookResult<Option<Group>> {
                Ok(self.with_state(|s| s.group_by_name(name).cloned()).await)
            }

            async fn profile_groups(&self, profile_id: i64) -> PhonebookResult<Vec<Group>> {
                Ok(self.with_state(|s| s.profile_groups(profile_id)).await)
            }

            async fn add_profile_groups(
                &self,
                profile_id: i64,
                group_ids: &[i64],
            ) -> PhonebookResult<()> {
                self.with_state(|s| s.add_profile_groups(profile_id, group_ids))
                    .await
            }

            async fn remove_profile_groups(
                &self,
                profile_id: i64,
                group_ids: &[i64],
            ) -> PhonebookResult<()> {
                self.with_state(|s| s.remove_profile_groups(profile_id, group_ids))
                    .await;
                Ok(())
            }

            async fn create_invite(&self, invite: NewInvite) -> PhonebookResult<Invite> {
                self.with_state(|s| s.create_invite(invite)).await
            }

            async fn invites_for(&self, recipient: &str) -> PhonebookResult<Vec<Invite>> {
                Ok(self.with_state(|s| s.invites_for(recipient)).await)
            }

            async fn transaction(&self) -> PhonebookResult<Box<dyn StoreTransaction>> {
                self.begin().await
            }
        }
    };
}

memory_store_impl!(MemoryStore);
memory_store_impl!(MemoryTransaction);

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    fn store(&self) -> &dyn PhonebookStore {
        self
    }

    async fn commit(self: Box<Self>) -> PhonebookResult<()> {
        let Self {
            mut committed,
            working,
        } = *self;
        *committed = working.into_inner();
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> PhonebookResult<()> {
        drop(self);
        Ok(())
    }
}
