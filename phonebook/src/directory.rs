//! The directory-service seam (an LDAP-like people directory).
//!
//! Profile saves can mirror person attributes and the photo into the
//! directory. This is off unless `directory_sync` is set in settings.

use async_trait::async_trait;
use phonebook_core::PhonebookResult;
use serde::Serialize;

/// Person attributes mirrored to the directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersonAttributes {
    pub first_name: String,
    pub last_name: String,
    pub biography: String,
    pub website: Option<String>,
    pub irc_nickname: String,
    /// Directory-side id of the IRC nickname entry, if one exists.
    pub irc_nickname_unique_id: String,
}

/// What to do with the directory's copy of the photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoUpdate {
    Unchanged,
    /// Replace with these JPEG bytes.
    Replace(Vec<u8>),
    Remove,
}

/// A people directory keyed by the user's `unique_id`.
#[async_trait]
pub trait DirectoryService: Send + Sync {
    /// Writes the person's attributes.
    async fn update_person(&self, unique_id: &str, attrs: &PersonAttributes)
        -> PhonebookResult<()>;

    /// Replaces or removes the person's photo.
    async fn update_profile_photo(&self, unique_id: &str, photo: &PhotoUpdate)
        -> PhonebookResult<()>;
}

/// A directory that accepts every update and stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDirectory;

#[async_trait]
impl DirectoryService for NullDirectory {
    async fn update_person(&self, unique_id: &str, _attrs: &PersonAttributes) -> PhonebookResult<()> {
        tracing::trace!(unique_id, "null directory: update_person");
        Ok(())
    }

    async fn update_profile_photo(&self, unique_id: &str, _photo: &PhotoUpdate) -> PhonebookResult<()> {
        tracing::trace!(unique_id, "null directory: update_profile_photo");
        Ok(())
    }
}
