//! Error types for the phonebook crates.
//!
//! [`ValidationError`] carries a user-facing message for a single rejected
//! field value. [`PhonebookError`] is the crate-wide error enum: storage and
//! directory failures, configuration problems, image codec failures, and
//! validation errors that escape a form.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

/// A user-facing validation failure.
///
/// Validation errors are either simple (one message) or compound (per-field
/// message lists). Forms turn them into field-level error messages.
///
/// # Examples
///
/// ```
/// use phonebook_core::error::ValidationError;
///
/// let err = ValidationError::new("Images must be either PNG or JPG.", "invalid_image_type");
/// assert_eq!(err.to_string(), "Images must be either PNG or JPG.");
///
/// let mut field_errors = std::collections::HashMap::new();
/// field_errors.insert("groups".to_string(), vec![err]);
/// let compound = ValidationError::with_field_errors(field_errors);
/// assert!(compound.to_string().starts_with("groups:"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The primary error message.
    pub message: String,
    /// A short code identifying the kind of failure (e.g. "required", "invalid").
    pub code: String,
    /// Parameters used to build the message.
    pub params: HashMap<String, String>,
    /// Per-field validation errors, keyed by field name.
    pub field_errors: HashMap<String, Vec<Self>>,
}

impl ValidationError {
    /// Creates a new `ValidationError` with a message and code.
    pub fn new(message: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: code.into(),
            params: HashMap::new(),
            field_errors: HashMap::new(),
        }
    }

    /// Creates a `ValidationError` containing per-field errors.
    pub fn with_field_errors(field_errors: HashMap<String, Vec<Self>>) -> Self {
        Self {
            message: String::new(),
            code: String::new(),
            params: HashMap::new(),
            field_errors,
        }
    }

    /// Adds a parameter to this validation error.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Flattens this error into `(field, messages)` pairs.
    ///
    /// A simple error is reported under `field`; a compound error reports
    /// each of its own fields.
    pub fn into_messages(self, field: &str) -> Vec<(String, Vec<String>)> {
        if self.field_errors.is_empty() {
            return vec![(field.to_string(), vec![self.message])];
        }
        self.field_errors
            .into_iter()
            .map(|(name, errors)| {
                let messages = errors.into_iter().map(|e| e.to_string()).collect();
                (name, messages)
            })
            .collect()
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.message.is_empty() {
            write!(f, "{}", self.message)?;
        } else if !self.field_errors.is_empty() {
            let mut first = true;
            for (field, errors) in &self.field_errors {
                for error in errors {
                    if !first {
                        write!(f, "; ")?;
                    }
                    write!(f, "{field}: {error}")?;
                    first = false;
                }
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

/// The primary error type for the phonebook crates.
#[derive(Error, Debug)]
pub enum PhonebookError {
    // ── Lookups ──────────────────────────────────────────────────────

    /// A lookup expected exactly one record but found none.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// A lookup expected exactly one record but found several.
    #[error("Multiple objects returned when one expected: {0}")]
    MultipleObjectsReturned(String),

    // ── Storage ──────────────────────────────────────────────────────

    /// A generic database error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A database integrity constraint was violated.
    #[error("Integrity error: {0}")]
    IntegrityError(String),

    /// An operational database error (connection failure, bad transaction state).
    #[error("Operational error: {0}")]
    OperationalError(String),

    // ── Validation ───────────────────────────────────────────────────

    /// A form could not be used because its data did not validate.
    #[error("Validation error: {0}")]
    ValidationError(ValidationError),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    // ── Collaborators ────────────────────────────────────────────────

    /// Decoding or encoding an image failed outside of user validation.
    #[error("Image error: {0}")]
    ImageError(String),

    /// The directory service rejected or failed an update.
    #[error("Directory error: {0}")]
    DirectoryError(String),

    // ── IO ───────────────────────────────────────────────────────────

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    // ── Security ─────────────────────────────────────────────────────

    /// A potentially malicious value was detected (e.g. a path escape).
    #[error("Suspicious operation: {0}")]
    SuspiciousOperation(String),
}

impl PhonebookError {
    /// Returns `true` for failures caused by the submitted data rather than
    /// by a collaborator.
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::ValidationError(_) | Self::SuspiciousOperation(_) | Self::DoesNotExist(_)
        )
    }
}

impl From<ValidationError> for PhonebookError {
    fn from(err: ValidationError) -> Self {
        Self::ValidationError(err)
    }
}

/// A convenience type alias for `Result<T, PhonebookError>`.
pub type PhonebookResult<T> = Result<T, PhonebookError>;
