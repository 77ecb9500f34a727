//! `ProfileForm::save` against both store backends, media storage and the
//! directory seam.

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use phonebook::directory::{DirectoryService, NullDirectory, PersonAttributes, PhotoUpdate};
use phonebook::media::{FileSystemStorage, MediaStorage};
use phonebook::{ProfileForm, RequestContext};
use phonebook_core::{PhonebookError, PhonebookResult, Settings};
use phonebook_db::{
    Address, Country, Group, Invite, MemoryStore, NewInvite, NewUser, PhonebookStore, PostalCode,
    Profile, StoreTransaction, User,
};
use phonebook_forms::{FormData, UploadedFile};

fn backends() -> Vec<Arc<dyn PhonebookStore>> {
    let mut stores: Vec<Arc<dyn PhonebookStore>> = vec![Arc::new(MemoryStore::new())];
    #[cfg(feature = "sqlite")]
    stores.push(Arc::new(phonebook_db::SqliteStore::memory().unwrap()));
    stores
}

fn media() -> FileSystemStorage {
    let dir = std::env::temp_dir().join(format!("phonebook-save-{}", uuid::Uuid::new_v4().simple()));
    FileSystemStorage::new(dir)
}

fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = ImageBuffer::from_pixel(width, height, Rgb([10u8, 120, 250]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Jpeg)
        .unwrap();
    out.into_inner()
}

async fn member(store: &dyn PhonebookStore) -> (User, Country) {
    let user = store
        .create_user(NewUser::new("u-1", "ada@example.com"))
        .await
        .unwrap();
    let country = store.create_country("gb", "United Kingdom").await.unwrap();
    (user, country)
}

async fn valid_form(store: Arc<dyn PhonebookStore>, settings: &Settings, data: FormData) -> ProfileForm {
    let mut form = ProfileForm::new(store, settings, None).await.unwrap();
    form.bind(&data);
    assert!(form.is_valid().await.unwrap(), "{:?}", form.errors());
    form
}

fn group_names(groups: &[Group]) -> Vec<&str> {
    groups.iter().map(|g| g.name.as_str()).collect()
}

#[tokio::test]
async fn save_writes_profile_address_and_groups() {
    for store in backends() {
        let (user, country) = member(store.as_ref()).await;
        let staff = store.create_group("staff", true).await.unwrap();
        let profile_id = store.get_profile(user.id).await.unwrap().id;
        store.add_profile_groups(profile_id, &[staff.id]).await.unwrap();

        let form = valid_form(
            store.clone(),
            &Settings::default(),
            FormData::new()
                .with_field("first_name", "Ada")
                .with_field("last_name", "Lovelace")
                .with_field("biography", "Analyst")
                .with_field("website", "ada.example.org")
                .with_field("groups", "Math, poetry")
                .with_field("street", "12 St James's Square")
                .with_field("city", "London")
                .with_field("postal_code", "SW1Y 4JH")
                .with_field("country", country.id.to_string()),
        )
        .await;

        let saved = form
            .save(&RequestContext::new(user.clone()), &NullDirectory, &media())
            .await
            .unwrap();
        assert_eq!(group_names(&saved.groups.added), vec!["math", "poetry"]);
        assert!(saved.groups.removed.is_empty());

        let profile = store.get_profile(user.id).await.unwrap();
        assert_eq!(profile.first_name, "Ada", "{}", store.vendor());
        assert_eq!(profile.last_name, "Lovelace");
        assert_eq!(profile.biography, "Analyst");
        assert_eq!(profile.website.as_deref(), Some("http://ada.example.org"));

        let address = store.get_address(user.id).await.unwrap();
        assert_eq!(address.city, "London");
        assert_eq!(address.country_id, Some(country.id));
        let postal_code = store
            .get_postal_code(address.postal_code_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(postal_code.code, "SW1Y 4JH");

        let groups = store.profile_groups(profile.id).await.unwrap();
        assert_eq!(group_names(&groups), vec!["math", "poetry", "staff"]);
    }
}

#[tokio::test]
async fn empty_postal_code_and_country_clear_the_address() {
    for store in backends() {
        let (user, country) = member(store.as_ref()).await;
        let settings = Settings::default();
        let base = || FormData::new().with_field("last_name", "Lovelace");

        let form = valid_form(
            store.clone(),
            &settings,
            base()
                .with_field("postal_code", "EC1")
                .with_field("country", country.id.to_string()),
        )
        .await;
        form.save(&RequestContext::new(user.clone()), &NullDirectory, &media())
            .await
            .unwrap();
        assert!(store.get_address(user.id).await.unwrap().postal_code_id.is_some());

        let form = valid_form(store.clone(), &settings, base()).await;
        form.save(&RequestContext::new(user.clone()), &NullDirectory, &media())
            .await
            .unwrap();
        let address = store.get_address(user.id).await.unwrap();
        assert_eq!(address.postal_code_id, None, "{}", store.vendor());
        assert_eq!(address.country_id, None);
    }
}

#[tokio::test]
async fn shared_postal_codes_are_reused() {
    for store in backends() {
        let (ada, _) = member(store.as_ref()).await;
        let bob = store
            .create_user(NewUser::new("u-2", "bob@example.com"))
            .await
            .unwrap();
        let data = || {
            FormData::new()
                .with_field("last_name", "Someone")
                .with_field("postal_code", "10115")
        };

        for user in [&ada, &bob] {
            let form = valid_form(store.clone(), &Settings::default(), data()).await;
            form.save(&RequestContext::new(user.clone()), &NullDirectory, &media())
                .await
                .unwrap();
        }

        let first = store.get_address(ada.id).await.unwrap().postal_code_id;
        let second = store.get_address(bob.id).await.unwrap().postal_code_id;
        assert!(first.is_some());
        assert_eq!(first, second, "{}", store.vendor());
    }
}

async fn photo_files(media: &FileSystemStorage) -> Vec<String> {
    let mut names = Vec::new();
    let Ok(mut dir) = tokio::fs::read_dir(media.location().join("photos")).await else {
        return names;
    };
    while let Some(entry) = dir.next_entry().await.unwrap() {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    names
}

/// Delegates to another store but fails every `save_profile` made inside
/// a transaction.
struct FailingProfileStore {
    inner: Arc<dyn PhonebookStore>,
}

impl FailingProfileStore {
    fn target(&self) -> &dyn PhonebookStore {
        self.inner.as_ref()
    }

    async fn begin(&self) -> PhonebookResult<Box<dyn StoreTransaction>> {
        let inner = self.inner.transaction().await?;
        Ok(Box::new(FailingTransaction { inner }))
    }
}

struct FailingTransaction {
    inner: Box<dyn StoreTransaction>,
}

impl FailingTransaction {
    fn target(&self) -> &dyn PhonebookStore {
        self.inner.store()
    }

    async fn begin(&self) -> PhonebookResult<Box<dyn StoreTransaction>> {
        self.inner.transaction().await
    }
}

macro_rules! delegating_store {
    ($ty:ty, $fail_profiles:expr) => {
        #[async_trait]
        impl PhonebookStore for $ty {
            fn vendor(&self) -> &str {
                self.target().vendor()
            }

            async fn create_user(&self, user: NewUser) -> PhonebookResult<User> {
                self.target().create_user(user).await
            }

            async fn get_user(&self, id: i64) -> PhonebookResult<User> {
                self.target().get_user(id).await
            }

            async fn count_users_with_email(&self, email: &str) -> PhonebookResult<u64> {
                self.target().count_users_with_email(email).await
            }

            async fn get_profile(&self, user_id: i64) -> PhonebookResult<Profile> {
                self.target().get_profile(user_id).await
            }

            async fn save_profile(&self, profile: &Profile) -> PhonebookResult<()> {
                if $fail_profiles {
                    return Err(PhonebookError::DatabaseError("disk full".into()));
                }
                self.target().save_profile(profile).await
            }

            async fn get_address(&self, user_id: i64) -> PhonebookResult<Address> {
                self.target().get_address(user_id).await
            }

            async fn save_address(&self, address: &Address) -> PhonebookResult<()> {
                self.target().save_address(address).await
            }

            async fn create_country(&self, code: &str, name: &str) -> PhonebookResult<Country> {
                self.target().create_country(code, name).await
            }

            async fn set_country_name(&self, country_id: i64, locale: &str, name: &str) -> PhonebookResult<()> {
                self.target().set_country_name(country_id, locale, name).await
            }

            async fn get_country(&self, id: i64) -> PhonebookResult<Option<Country>> {
                self.target().get_country(id).await
            }

            async fn localized_countries(&self, locale: &str) -> PhonebookResult<Vec<(Country, String)>> {
                self.target().localized_countries(locale).await
            }

            async fn get_or_create_postal_code(&self, code: &str) -> PhonebookResult<(PostalCode, bool)> {
                self.target().get_or_create_postal_code(code).await
            }

            async fn get_postal_code(&self, id: i64) -> PhonebookResult<Option<PostalCode>> {
                self.target().get_postal_code(id).await
            }

            async fn create_group(&self, name: &str, system: bool) -> PhonebookResult<Group> {
                self.target().create_group(name, system).await
            }

            async fn get_or_create_group(&self, name: &str) -> PhonebookResult<(Group, bool)> {
                self.target().get_or_create_group(name).await
            }

            async fn find_group(&self, name: &str) -> PhonebookResult<Option<Group>> {
                self.target().find_group(name).await
            }

            async fn profile_groups(&self, profile_id: i64) -> PhonebookResult<Vec<Group>> {
                self.target().profile_groups(profile_id).await
            }

            async fn add_profile_groups(&self, profile_id: i64, group_ids: &[i64]) -> PhonebookResult<()> {
                self.target().add_profile_groups(profile_id, group_ids).await
            }

            async fn remove_profile_groups(&self, profile_id: i64, group_ids: &[i64]) -> PhonebookResult<()> {
                self.target().remove_profile_groups(profile_id, group_ids).await
            }

            async fn create_invite(&self, invite: NewInvite) -> PhonebookResult<Invite> {
                self.target().create_invite(invite).await
            }

            async fn invites_for(&self, recipient: &str) -> PhonebookResult<Vec<Invite>> {
                self.target().invites_for(recipient).await
            }

            async fn transaction(&self) -> PhonebookResult<Box<dyn StoreTransaction>> {
                self.begin().await
            }
        }
    };
}

delegating_store!(FailingProfileStore, false);
delegating_store!(FailingTransaction, true);

#[async_trait]
impl StoreTransaction for FailingTransaction {
    fn store(&self) -> &dyn PhonebookStore {
        self
    }

    async fn commit(self: Box<Self>) -> PhonebookResult<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> PhonebookResult<()> {
        self.inner.rollback().await
    }
}

#[tokio::test]
async fn failed_save_rolls_everything_back() {
    for inner in backends() {
        let store = Arc::new(FailingProfileStore { inner });
        let (user, _) = member(store.as_ref()).await;
        let old = store.create_group("old", false).await.unwrap();
        let profile_id = store.get_profile(user.id).await.unwrap().id;
        store.add_profile_groups(profile_id, &[old.id]).await.unwrap();

        let form = valid_form(
            store.clone(),
            &Settings::default(),
            FormData::new()
                .with_field("last_name", "Lovelace")
                .with_field("groups", "new")
                .with_field("city", "London")
                .with_field("postal_code", "N1"),
        )
        .await;

        let err = form
            .save(&RequestContext::new(user.clone()), &NullDirectory, &media())
            .await
            .unwrap_err();
        assert!(matches!(err, PhonebookError::DatabaseError(_)));

        let groups = store.profile_groups(profile_id).await.unwrap();
        assert_eq!(group_names(&groups), vec!["old"], "{}", store.vendor());
        assert!(store.find_group("new").await.unwrap().is_none());
        let address = store.get_address(user.id).await.unwrap();
        assert!(address.city.is_empty());
        assert!(address.postal_code_id.is_none());

        // The store is usable again afterwards.
        store.get_or_create_group("later").await.unwrap();
        store.transaction().await.unwrap().rollback().await.unwrap();
    }
}

#[tokio::test]
async fn failed_save_leaves_photos_untouched() {
    for inner in backends() {
        let media = media();
        let (user, _) = member(inner.as_ref()).await;
        let failing = Arc::new(FailingProfileStore {
            inner: inner.clone(),
        });
        let upload = |width| {
            FormData::new()
                .with_field("last_name", "Lovelace")
                .with_file("photo", UploadedFile::new("me.jpg", "image/jpeg", jpeg(width, width)))
        };

        let form = valid_form(failing.clone(), &Settings::default(), upload(50)).await;
        form.save(&RequestContext::new(user.clone()), &NullDirectory, &media)
            .await
            .unwrap_err();
        assert!(photo_files(&media).await.is_empty(), "{}", inner.vendor());
        assert!(inner.get_profile(user.id).await.unwrap().photo.is_none());

        let form = valid_form(inner.clone(), &Settings::default(), upload(60)).await;
        form.save(&RequestContext::new(user.clone()), &NullDirectory, &media)
            .await
            .unwrap();
        let path = media.path("photos/u-1.jpg").unwrap();
        let original = tokio::fs::read(&path).await.unwrap();

        let form = valid_form(failing.clone(), &Settings::default(), upload(70)).await;
        form.save(&RequestContext::new(user.clone()), &NullDirectory, &media)
            .await
            .unwrap_err();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), original);
        assert_eq!(photo_files(&media).await, vec!["u-1.jpg"]);
        assert_eq!(
            inner.get_profile(user.id).await.unwrap().photo.as_deref(),
            Some("photos/u-1.jpg")
        );
        tokio::fs::remove_dir_all(media.location()).await.unwrap();
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_saves_for_different_users_both_succeed() {
    for store in backends() {
        let (ada, _) = member(store.as_ref()).await;
        let bob = store
            .create_user(NewUser::new("u-2", "bob@example.com"))
            .await
            .unwrap();
        let media = media();
        let settings = Settings::default();

        for round in 0..20 {
            let data = |name: &str| {
                FormData::new()
                    .with_field("last_name", format!("{name}-{round}"))
                    .with_field("groups", name)
                    .with_field("postal_code", "10115")
            };
            let ada_form = valid_form(store.clone(), &settings, data("ada")).await;
            let bob_form = valid_form(store.clone(), &settings, data("bob")).await;
            let ada_ctx = RequestContext::new(ada.clone());
            let bob_ctx = RequestContext::new(bob.clone());

            let (a, b) = tokio::join!(
                ada_form.save(&ada_ctx, &NullDirectory, &media),
                bob_form.save(&bob_ctx, &NullDirectory, &media),
            );
            a.unwrap();
            b.unwrap();

            let vendor = store.vendor();
            assert_eq!(store.get_profile(ada.id).await.unwrap().last_name, format!("ada-{round}"), "{vendor}");
            assert_eq!(store.get_profile(bob.id).await.unwrap().last_name, format!("bob-{round}"), "{vendor}");
        }

        let ada_postal = store.get_address(ada.id).await.unwrap().postal_code_id;
        assert!(ada_postal.is_some());
        assert_eq!(ada_postal, store.get_address(bob.id).await.unwrap().postal_code_id);
    }
}

#[derive(Default)]
struct RecordingDirectory {
    people: Mutex<Vec<(String, PersonAttributes)>>,
    photos: Mutex<Vec<(String, PhotoUpdate)>>,
}

#[async_trait]
impl DirectoryService for RecordingDirectory {
    async fn update_person(&self, unique_id: &str, attrs: &PersonAttributes) -> PhonebookResult<()> {
        self.people
            .lock()
            .unwrap()
            .push((unique_id.to_string(), attrs.clone()));
        Ok(())
    }

    async fn update_profile_photo(&self, unique_id: &str, photo: &PhotoUpdate) -> PhonebookResult<()> {
        self.photos
            .lock()
            .unwrap()
            .push((unique_id.to_string(), photo.clone()));
        Ok(())
    }
}

#[tokio::test]
async fn directory_is_only_written_when_enabled() {
    let store: Arc<dyn PhonebookStore> = Arc::new(MemoryStore::new());
    let (user, _) = member(store.as_ref()).await;
    let data = || {
        FormData::new()
            .with_field("last_name", "Lovelace")
            .with_field("irc_nickname", "ada")
            .with_field("photo_delete", "on")
    };

    let directory = RecordingDirectory::default();
    let form = valid_form(store.clone(), &Settings::default(), data()).await;
    form.save(&RequestContext::new(user.clone()), &directory, &media())
        .await
        .unwrap();
    assert!(directory.people.lock().unwrap().is_empty());
    assert!(directory.photos.lock().unwrap().is_empty());

    let settings = Settings {
        directory_sync: true,
        ..Settings::default()
    };
    let form = valid_form(store.clone(), &settings, data()).await;
    form.save(&RequestContext::new(user.clone()), &directory, &media())
        .await
        .unwrap();

    let people = directory.people.lock().unwrap();
    assert_eq!(people.len(), 1);
    assert_eq!(people[0].0, "u-1");
    assert_eq!(people[0].1.last_name, "Lovelace");
    assert_eq!(people[0].1.irc_nickname, "ada");
    assert_eq!(
        *directory.photos.lock().unwrap(),
        vec![("u-1".to_string(), PhotoUpdate::Remove)]
    );
}

#[tokio::test]
async fn photo_is_stored_then_removed() {
    let store: Arc<dyn PhonebookStore> = Arc::new(MemoryStore::new());
    let (user, _) = member(store.as_ref()).await;
    let media = media();

    let upload = FormData::new()
        .with_field("last_name", "Lovelace")
        .with_file("photo", UploadedFile::new("me.jpg", "image/jpeg", jpeg(640, 480)));
    let form = valid_form(store.clone(), &Settings::default(), upload).await;
    let saved = form
        .save(&RequestContext::new(user.clone()), &NullDirectory, &media)
        .await
        .unwrap();

    assert_eq!(saved.profile.photo.as_deref(), Some("photos/u-1.jpg"));
    let path: PathBuf = media.path("photos/u-1.jpg").unwrap();
    let stored = image::open(&path).unwrap();
    assert_eq!((stored.width(), stored.height()), (300, 300));

    let delete = FormData::new()
        .with_field("last_name", "Lovelace")
        .with_field("photo_delete", "on");
    let form = valid_form(store.clone(), &Settings::default(), delete).await;
    let saved = form
        .save(&RequestContext::new(user.clone()), &NullDirectory, &media)
        .await
        .unwrap();

    assert!(saved.profile.photo.is_none());
    assert!(store.get_profile(user.id).await.unwrap().photo.is_none());
    assert!(!media.exists("photos/u-1.jpg").await.unwrap());
    tokio::fs::remove_dir_all(media.location()).await.unwrap();
}

#[tokio::test]
async fn new_photo_wins_over_delete() {
    let store: Arc<dyn PhonebookStore> = Arc::new(MemoryStore::new());
    let (user, _) = member(store.as_ref()).await;
    let media = media();

    let data = FormData::new()
        .with_field("last_name", "Lovelace")
        .with_field("photo_delete", "on")
        .with_file("photo", UploadedFile::new("me.jpg", "image/jpeg", jpeg(40, 40)));
    let form = valid_form(store.clone(), &Settings::default(), data).await;
    let saved = form
        .save(&RequestContext::new(user), &NullDirectory, &media)
        .await
        .unwrap();

    assert_eq!(saved.profile.photo.as_deref(), Some("photos/u-1.jpg"));
    assert!(media.exists("photos/u-1.jpg").await.unwrap());
    tokio::fs::remove_dir_all(media.location()).await.unwrap();
}

#[tokio::test]
async fn invalid_photo_keeps_other_fields_checked() {
    let store: Arc<dyn PhonebookStore> = Arc::new(MemoryStore::new());
    let mut form = ProfileForm::new(store, &Settings::default(), None)
        .await
        .unwrap();
    form.bind(
        &FormData::new()
            .with_field("groups", "bad!")
            .with_file("photo", UploadedFile::new("me.gif", "image/gif", vec![0; 16])),
    );
    assert!(!form.is_valid().await.unwrap());
    assert!(form.errors().contains_key("photo"));
    assert!(form.errors().contains_key("groups"));
    assert!(form.errors().contains_key("last_name"));
}
