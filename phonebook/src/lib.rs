//! # phonebook
//!
//! Forms for a community phonebook: search, profile editing, account
//! deletion, vouching and invites.
//!
//! Forms are built on [`phonebook_forms`] and persist through the
//! [`PhonebookStore`](phonebook_db::PhonebookStore) seam, so the same code
//! runs against the in-memory store and SQLite.
//!
//! ## Modules
//!
//! - [`search`] - Search parameters with a tolerant page size
//! - [`profile`] - The profile edit form and its transactional save
//! - [`photo`] - Profile photo validation and cropping
//! - [`groups`] - Group tag parsing and membership reconciliation
//! - [`confirm`] - Delete and vouch confirmation forms
//! - [`invite`] - Invites for people who are not members yet
//! - [`directory`] - The directory-service seam
//! - [`media`] - Storage for uploaded photos
//! - [`context`] - Per-request context and tracing span

pub mod confirm;
pub mod context;
pub mod directory;
pub mod groups;
pub mod invite;
pub mod media;
pub mod photo;
pub mod profile;
pub mod search;

pub use confirm::{DeleteForm, VouchForm};
pub use context::RequestContext;
pub use directory::{DirectoryService, NullDirectory, PersonAttributes, PhotoUpdate};
pub use groups::{clean_groups, reconcile_groups, GroupChanges};
pub use invite::{clean_recipient, InviteForm};
pub use media::{FileSystemStorage, MediaStorage};
pub use photo::{clean_photo, PhotoConfig, ProcessedPhoto};
pub use profile::{clean_country, ProfileData, ProfileForm, SavedProfile};
pub use search::{clean_limit, SearchForm, SearchQuery};
