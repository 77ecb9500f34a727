//! Storage for uploaded media (profile photos).
//!
//! Names are relative to the storage root, e.g. `photos/u-42.jpg`. Writes
//! go to a temporary file in the target directory and are renamed into
//! place, so readers never see a half-written photo.
//!
//! A profile save first writes its photo under a [`staged_photo_name`] and
//! only [`rename`](MediaStorage::rename)s it over the real name once the
//! store transaction has committed.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use phonebook_core::{PhonebookError, PhonebookResult, Settings};
use uuid::Uuid;

/// Directory (relative to the root) profile photos are stored in.
pub const PHOTO_DIR: &str = "photos";

/// A backend for media files.
#[async_trait]
pub trait MediaStorage: Send + Sync {
    /// Writes `content` under `name`, replacing any existing file.
    async fn save(&self, name: &str, content: &[u8]) -> PhonebookResult<()>;

    /// Moves `from` to `to`, replacing any existing file at `to`.
    async fn rename(&self, from: &str, to: &str) -> PhonebookResult<()>;

    /// Deletes the file. A missing file is not an error.
    async fn delete(&self, name: &str) -> PhonebookResult<()>;

    /// Checks whether the file exists.
    async fn exists(&self, name: &str) -> PhonebookResult<bool>;
}

/// Returns the storage name of a user's profile photo.
///
/// Fails with `SuspiciousOperation` for ids that could escape the photo
/// directory.
pub fn photo_name(unique_id: &str) -> PhonebookResult<String> {
    if unique_id.is_empty()
        || unique_id.contains(['/', '\\', '\0'])
        || unique_id.starts_with('.')
    {
        return Err(PhonebookError::SuspiciousOperation(format!(
            "unusable photo name for unique_id {unique_id:?}"
        )));
    }
    Ok(format!("{PHOTO_DIR}/{unique_id}.jpg"))
}

/// Returns a fresh name to stage a user's new photo under until the save
/// commits. Staged names start with a dot and never collide.
pub fn staged_photo_name(unique_id: &str) -> PhonebookResult<String> {
    photo_name(unique_id)?;
    Ok(format!(
        "{PHOTO_DIR}/.{unique_id}.{}.jpg",
        Uuid::new_v4().simple()
    ))
}

/// Filesystem-backed media storage rooted at a directory.
#[derive(Debug, Clone)]
pub struct FileSystemStorage {
    location: PathBuf,
}

impl FileSystemStorage {
    /// Creates a storage rooted at `location`.
    pub fn new(location: impl Into<PathBuf>) -> Self {
        Self {
            location: location.into(),
        }
    }

    /// Creates a storage rooted at the configured `media_root`.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.media_root.clone())
    }

    /// Returns the storage root.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Resolves a relative name to a filesystem path.
    ///
    /// Only plain relative names are accepted; absolute paths and `..`
    /// components are rejected.
    pub fn path(&self, name: &str) -> PhonebookResult<PathBuf> {
        let relative = Path::new(name);
        let plain = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(PhonebookError::SuspiciousOperation(format!(
                "media name {name:?} is not a plain relative path"
            )));
        }
        Ok(self.location.join(relative))
    }
}

#[async_trait]
impl MediaStorage for FileSystemStorage {
    async fn save(&self, name: &str, content: &[u8]) -> PhonebookResult<()> {
        let full_path = self.path(name)?;
        let parent = full_path
            .parent()
            .map_or_else(|| self.location.clone(), Path::to_path_buf);
        tokio::fs::create_dir_all(&parent).await?;

        let tmp_path = parent.join(format!(".{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&tmp_path, content).await?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &full_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        tracing::debug!(name, bytes = content.len(), "saved media file");
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> PhonebookResult<()> {
        let source = self.path(from)?;
        let target = self.path(to)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&source, &target).await?;
        tracing::debug!(from, to, "renamed media file");
        Ok(())
    }

    async fn delete(&self, name: &str) -> PhonebookResult<()> {
        let full_path = self.path(name)?;
        match tokio::fs::remove_file(&full_path).await {
            Ok(()) => {
                tracing::debug!(name, "deleted media file");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, name: &str) -> PhonebookResult<bool> {
        let full_path = self.path(name)?;
        Ok(tokio::fs::try_exists(&full_path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_storage() -> FileSystemStorage {
        let dir = std::env::temp_dir().join(format!("phonebook-media-{}", Uuid::new_v4().simple()));
        FileSystemStorage::new(dir)
    }

    #[test]
    fn test_photo_name() {
        assert_eq!(photo_name("u-42").unwrap(), "photos/u-42.jpg");
        for bad in ["", "../etc", "a/b", "a\\b", ".hidden"] {
            assert!(
                matches!(photo_name(bad), Err(PhonebookError::SuspiciousOperation(_))),
                "{bad:?}"
            );
        }
    }

    #[test]
    fn test_staged_photo_name() {
        let first = staged_photo_name("u-42").unwrap();
        let second = staged_photo_name("u-42").unwrap();
        assert!(first.starts_with("photos/.u-42."));
        assert!(first.ends_with(".jpg"));
        assert_ne!(first, second);
        assert!(FileSystemStorage::new("/srv/media").path(&first).is_ok());
        assert!(staged_photo_name("../x").is_err());
    }

    #[test]
    fn test_path_rejects_escapes() {
        let storage = FileSystemStorage::new("/srv/media");
        assert!(storage.path("photos/a.jpg").is_ok());
        assert!(storage.path("../a.jpg").is_err());
        assert!(storage.path("/etc/passwd").is_err());
        assert!(storage.path("").is_err());
    }

    #[tokio::test]
    async fn test_save_overwrite_delete() {
        let storage = temp_storage();
        storage.save("photos/u-1.jpg", b"first").await.unwrap();
        storage.save("photos/u-1.jpg", b"second").await.unwrap();
        let bytes = tokio::fs::read(storage.path("photos/u-1.jpg").unwrap())
            .await
            .unwrap();
        assert_eq!(bytes, b"second");
        assert!(storage.exists("photos/u-1.jpg").await.unwrap());

        storage.delete("photos/u-1.jpg").await.unwrap();
        assert!(!storage.exists("photos/u-1.jpg").await.unwrap());
        storage.delete("photos/u-1.jpg").await.unwrap();

        let staged = staged_photo_name("u-1").unwrap();
        storage.save("photos/u-1.jpg", b"old").await.unwrap();
        storage.save(&staged, b"new").await.unwrap();
        storage.rename(&staged, "photos/u-1.jpg").await.unwrap();
        assert!(!storage.exists(&staged).await.unwrap());
        let bytes = tokio::fs::read(storage.path("photos/u-1.jpg").unwrap())
            .await
            .unwrap();
        assert_eq!(bytes, b"new");
        storage.delete("photos/u-1.jpg").await.unwrap();

        let mut leftovers = tokio::fs::read_dir(storage.location().join(PHOTO_DIR))
            .await
            .unwrap();
        assert!(leftovers.next_entry().await.unwrap().is_none());
        tokio::fs::remove_dir_all(storage.location()).await.unwrap();
    }
}
