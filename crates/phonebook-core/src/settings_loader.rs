//! Settings loading from configuration files.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML or JSON file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `PHONEBOOK_DEBUG` | `debug` |
//! | `PHONEBOOK_LOG_LEVEL` | `log_level` |
//! | `PHONEBOOK_LANGUAGE_CODE` | `language_code` |
//! | `PHONEBOOK_PAGINATION_LIMIT` | `pagination_limit` |
//! | `PHONEBOOK_MAX_PHOTO_UPLOAD_SIZE` | `max_photo_upload_size` |
//! | `PHONEBOOK_MEDIA_ROOT` | `media_root` |
//! | `PHONEBOOK_DATABASE_PATH` | `database.path` |
//! | `PHONEBOOK_DIRECTORY_SYNC` | `directory_sync` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use phonebook_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/phonebook.toml").unwrap();
//! ```

use std::path::{Path, PathBuf};

use crate::error::PhonebookError;
use crate::settings::Settings;

/// Loads settings from a TOML string.
///
/// Keys missing from the TOML keep their default values.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, PhonebookError> {
    // Deserialize into a generic value first so it can be merged over the
    // serialized defaults.
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| PhonebookError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;

    merge_over_defaults(toml_to_json(toml_value), "TOML")
}

/// Loads settings from a TOML file.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, PhonebookError> {
    from_toml_str(&read_config(path.as_ref(), "TOML")?)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, PhonebookError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from a JSON string.
pub fn from_json_str(json_str: &str) -> Result<Settings, PhonebookError> {
    let json_value: serde_json::Value = serde_json::from_str(json_str)
        .map_err(|e| PhonebookError::ConfigurationError(format!("Failed to parse JSON: {e}")))?;

    merge_over_defaults(json_value, "JSON")
}

/// Loads settings from a JSON file.
pub fn from_json_file(path: impl AsRef<Path>) -> Result<Settings, PhonebookError> {
    from_json_str(&read_config(path.as_ref(), "JSON")?)
}

/// Loads settings from a JSON file and then applies environment variable overrides.
pub fn from_json_file_with_env(path: impl AsRef<Path>) -> Result<Settings, PhonebookError> {
    let mut settings = from_json_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Loads settings from just environment variables (starting from defaults).
pub fn from_env() -> Settings {
    let mut settings = Settings::default();
    apply_env_overrides(&mut settings);
    settings
}

/// Applies `PHONEBOOK_*` environment variable overrides to a settings struct.
///
/// Numeric values that fail to parse leave the setting unchanged. Boolean
/// values accept "true", "1" and "yes"; anything else is false.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(val) = std::env::var("PHONEBOOK_DEBUG") {
        settings.debug = parse_flag(&val);
    }

    if let Ok(val) = std::env::var("PHONEBOOK_LOG_LEVEL") {
        settings.log_level = val;
    }

    if let Ok(val) = std::env::var("PHONEBOOK_LANGUAGE_CODE") {
        settings.language_code = val;
    }

    if let Ok(val) = std::env::var("PHONEBOOK_PAGINATION_LIMIT") {
        if let Ok(limit) = val.parse::<usize>() {
            settings.pagination_limit = limit;
        }
    }

    if let Ok(val) = std::env::var("PHONEBOOK_MAX_PHOTO_UPLOAD_SIZE") {
        if let Ok(size) = val.parse::<u64>() {
            settings.max_photo_upload_size = size;
        }
    }

    if let Ok(val) = std::env::var("PHONEBOOK_MEDIA_ROOT") {
        settings.media_root = PathBuf::from(val);
    }

    if let Ok(val) = std::env::var("PHONEBOOK_DATABASE_PATH") {
        settings.database.path = val;
    }

    if let Ok(val) = std::env::var("PHONEBOOK_DIRECTORY_SYNC") {
        settings.directory_sync = parse_flag(&val);
    }
}

// ============================================================
// Helpers
// ============================================================

fn parse_flag(val: &str) -> bool {
    matches!(val.to_lowercase().as_str(), "true" | "1" | "yes")
}

fn read_config(path: &Path, format: &str) -> Result<String, PhonebookError> {
    std::fs::read_to_string(path).map_err(|e| {
        PhonebookError::ConfigurationError(format!(
            "Failed to read {format} file '{}': {e}",
            path.display()
        ))
    })
}

fn merge_over_defaults(
    value: serde_json::Value,
    format: &str,
) -> Result<Settings, PhonebookError> {
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        PhonebookError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, value);
    serde_json::from_value(merged).map_err(|e| {
        PhonebookError::ConfigurationError(format!(
            "Failed to deserialize settings from {format}: {e}"
        ))
    })
}

/// Converts a TOML value to a `serde_json::Value`.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
