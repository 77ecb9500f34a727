//! Settings for the phonebook forms.
//!
//! [`Settings`] holds every configurable value the forms and stores read.
//! There is no global instance: callers build one (usually through
//! [`settings_loader`](crate::settings_loader)) and pass it to the forms that
//! need it.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default page size for search results.
pub const DEFAULT_PAGINATION_LIMIT: usize = 20;

/// Default maximum photo upload size (8 MiB).
pub const DEFAULT_MAX_PHOTO_UPLOAD_SIZE: u64 = 8 * 1024 * 1024;

/// Default edge length, in pixels, of a normalized profile photo.
pub const DEFAULT_PHOTO_DIMENSION: u32 = 300;

/// Relational store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The `SQLite` file path, or `:memory:`.
    pub path: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: "phonebook.sqlite3".to_string(),
        }
    }
}

/// The complete set of phonebook settings.
///
/// # Examples
///
/// ```
/// use phonebook_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.pagination_limit, 20);
/// assert_eq!(settings.language_code, "en-US");
/// assert!(!settings.directory_sync);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    // ── Core ─────────────────────────────────────────────────────────

    /// Whether debug mode is enabled (pretty logs instead of JSON).
    pub debug: bool,
    /// The log filter (e.g. "info", "phonebook=debug").
    pub log_level: String,

    // ── Internationalization ─────────────────────────────────────────

    /// Locale used for the country list when a form is built without one.
    pub language_code: String,

    // ── Search ───────────────────────────────────────────────────────

    /// Page size used when a search limit is missing or malformed.
    pub pagination_limit: usize,

    // ── Photos ───────────────────────────────────────────────────────

    /// Largest accepted photo upload, in bytes.
    pub max_photo_upload_size: u64,
    /// Edge length of the square a large photo is cropped to.
    pub photo_dimension: u32,
    /// JPEG quality (1-100) used when re-encoding photos.
    pub photo_jpeg_quality: u8,
    /// Directory processed photos are written under.
    pub media_root: PathBuf,

    // ── Storage ──────────────────────────────────────────────────────

    /// Relational store configuration.
    pub database: DatabaseSettings,

    // ── Directory ────────────────────────────────────────────────────

    /// Whether profile saves are pushed to the directory service.
    pub directory_sync: bool,

    // ── Escape hatch ─────────────────────────────────────────────────

    /// Custom settings that don't fit into the above categories.
    pub extra: HashMap<String, serde_json::Value>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "info".to_string(),
            language_code: "en-US".to_string(),
            pagination_limit: DEFAULT_PAGINATION_LIMIT,
            max_photo_upload_size: DEFAULT_MAX_PHOTO_UPLOAD_SIZE,
            photo_dimension: DEFAULT_PHOTO_DIMENSION,
            photo_jpeg_quality: 90,
            media_root: PathBuf::from("media"),
            database: DatabaseSettings::default(),
            directory_sync: false,
            extra: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let s = Settings::default();
        assert!(s.debug);
        assert_eq!(s.log_level, "info");
        assert_eq!(s.language_code, "en-US");
        assert_eq!(s.pagination_limit, 20);
        assert_eq!(s.max_photo_upload_size, 8_388_608);
        assert_eq!(s.photo_dimension, 300);
        assert_eq!(s.photo_jpeg_quality, 90);
        assert_eq!(s.media_root, PathBuf::from("media"));
        assert!(!s.directory_sync);
        assert!(s.extra.is_empty());
    }

    #[test]
    fn test_default_database() {
        let s = Settings::default();
        assert_eq!(s.database.path, "phonebook.sqlite3");
    }

    #[test]
    fn test_settings_serde_roundtrip_keeps_values() {
        let mut s = Settings::default();
        s.pagination_limit = 50;
        s.directory_sync = true;
        let json = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pagination_limit, 50);
        assert!(back.directory_sync);
    }
}
