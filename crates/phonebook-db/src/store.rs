//! The storage seam used by the phonebook forms.
//!
//! Forms never talk to a database directly; they go through
//! [`PhonebookStore`]. All methods are async because storage is I/O-bound.
//! Even the `SQLite` backend, whose driver is synchronous, runs its work on
//! `spawn_blocking` to keep the async interface.

use async_trait::async_trait;
use phonebook_core::PhonebookResult;

use crate::models::{Address, Country, Group, Invite, NewInvite, NewUser, PostalCode, Profile, User};

/// Storage operations the forms need, keyed by ids or unique fields.
///
/// # Transactions
///
/// [`transaction`](Self::transaction) returns a [`StoreTransaction`] that
/// owns the store until it is committed or rolled back. Other callers of
/// the same store wait in the meantime, so everything done between begin
/// and commit must go through the transaction itself. Dropping a
/// transaction without committing rolls it back.
///
/// # Get-or-create
///
/// [`get_or_create_group`](Self::get_or_create_group) and
/// [`get_or_create_postal_code`](Self::get_or_create_postal_code) return the
/// entity and whether it was created by this call.
#[async_trait]
pub trait PhonebookStore: Send + Sync {
    /// Returns the backend name (e.g. "memory", "sqlite").
    fn vendor(&self) -> &str;

    // ── Users ────────────────────────────────────────────────────────

    /// Creates a user together with an empty profile and address.
    async fn create_user(&self, user: NewUser) -> PhonebookResult<User>;

    /// Fetches a user by id. Fails with `DoesNotExist` when absent.
    async fn get_user(&self, id: i64) -> PhonebookResult<User>;

    /// Counts users registered with exactly this email address.
    async fn count_users_with_email(&self, email: &str) -> PhonebookResult<u64>;

    // ── Profiles & addresses ─────────────────────────────────────────

    /// Fetches the profile owned by a user.
    async fn get_profile(&self, user_id: i64) -> PhonebookResult<Profile>;

    /// Writes every column of an existing profile.
    async fn save_profile(&self, profile: &Profile) -> PhonebookResult<()>;

    /// Fetches the address owned by a user.
    async fn get_address(&self, user_id: i64) -> PhonebookResult<Address>;

    /// Writes every column of an existing address.
    async fn save_address(&self, address: &Address) -> PhonebookResult<()>;

    // ── Countries & postal codes ─────────────────────────────────────

    /// Registers a country with its default name.
    async fn create_country(&self, code: &str, name: &str) -> PhonebookResult<Country>;

    /// Sets the display name of a country for one locale.
    async fn set_country_name(&self, country_id: i64, locale: &str, name: &str)
        -> PhonebookResult<()>;

    /// Looks a country up by id; `None` when there is no such country.
    async fn get_country(&self, id: i64) -> PhonebookResult<Option<Country>>;

    /// Lists every country with its display name for `locale`, ordered by
    /// that name.
    async fn localized_countries(&self, locale: &str) -> PhonebookResult<Vec<(Country, String)>>;

    /// Fetches or creates the postal code with this exact code.
    async fn get_or_create_postal_code(&self, code: &str) -> PhonebookResult<(PostalCode, bool)>;

    /// Fetches a postal code by id.
    async fn get_postal_code(&self, id: i64) -> PhonebookResult<Option<PostalCode>>;

    // ── Groups ───────────────────────────────────────────────────────

    /// Creates a group with an explicit system flag.
    async fn create_group(&self, name: &str, system: bool) -> PhonebookResult<Group>;

    /// Fetches or creates a non-system group by name.
    async fn get_or_create_group(&self, name: &str) -> PhonebookResult<(Group, bool)>;

    /// Looks a group up by name.
    async fn find_group(&self, name: &str) -> PhonebookResult<Option<Group>>;

    /// Lists the groups a profile belongs to, ordered by name.
    async fn profile_groups(&self, profile_id: i64) -> PhonebookResult<Vec<Group>>;

    /// Attaches groups to a profile. Existing memberships are left alone.
    async fn add_profile_groups(&self, profile_id: i64, group_ids: &[i64]) -> PhonebookResult<()>;

    /// Detaches groups from a profile. Missing memberships are ignored.
    async fn remove_profile_groups(&self, profile_id: i64, group_ids: &[i64])
        -> PhonebookResult<()>;

    // ── Invites ──────────────────────────────────────────────────────

    /// Stores a new invite. Fails with `IntegrityError` on a duplicate code.
    async fn create_invite(&self, invite: NewInvite) -> PhonebookResult<Invite>;

    /// Lists invites sent to an email address, oldest first.
    async fn invites_for(&self, recipient: &str) -> PhonebookResult<Vec<Invite>>;

    // ── Transactions ─────────────────────────────────────────────────

    /// Begins a transaction, waiting for any open one on this store to
    /// finish. Fails with `OperationalError` when called on a transaction.
    async fn transaction(&self) -> PhonebookResult<Box<dyn StoreTransaction>>;
}

/// An open transaction. Reads see its own uncommitted writes.
#[async_trait]
pub trait StoreTransaction: PhonebookStore {
    /// The transaction as a plain store, for helpers that take
    /// `&dyn PhonebookStore`.
    fn store(&self) -> &dyn PhonebookStore;

    /// Makes the writes visible and releases the store.
    async fn commit(self: Box<Self>) -> PhonebookResult<()>;

    /// Discards the writes and releases the store.
    async fn rollback(self: Box<Self>) -> PhonebookResult<()>;
}
