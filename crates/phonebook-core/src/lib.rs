//! # phonebook-core
//!
//! Foundation types shared by every phonebook crate. Nothing here knows about
//! storage or forms.
//!
//! ## Modules
//!
//! - [`error`] - Error types and result aliases
//! - [`settings`] - Application settings passed explicitly to forms and stores
//! - [`settings_loader`] - Loading settings from TOML, JSON, and the environment
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{PhonebookError, PhonebookResult, ValidationError};
pub use settings::Settings;
