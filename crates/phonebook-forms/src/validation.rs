//! Validation pipeline for form processing.
//!
//! 1. Field-level validation (type coercion, per-field constraints)
//! 2. Form-level cleaning (async, may hit the store)
//!
//! Errors accumulate rather than short-circuiting, so all validation
//! issues are reported at once. Tolerant cleaners that fall back to a
//! default instead of failing report a [`Warning`].

use std::collections::HashMap;
use std::fmt;

use phonebook_db::Value;
use serde::Serialize;

use crate::fields::{clean_field_value, FormFieldDef};
use crate::form::Form;

/// A note from a tolerant cleaner: the submitted value was replaced by a
/// fallback. Warnings never make a form invalid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    /// The field whose value was replaced.
    pub field: String,
    /// What happened, for logs and diagnostics.
    pub message: String,
}

impl Warning {
    /// Creates a warning for a field.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Performs field-level validation for all fields.
///
/// Every field goes through [`clean_field_value`] and lands either in
/// `cleaned_data` or in `errors`.
pub fn clean_fields(
    field_defs: &[FormFieldDef],
    raw_data: &HashMap<String, Option<String>>,
    cleaned_data: &mut HashMap<String, Value>,
    errors: &mut HashMap<String, Vec<String>>,
) {
    for field in field_defs {
        let raw = raw_data.get(&field.name).and_then(|v| v.as_deref());

        match clean_field_value(field, raw) {
            Ok(value) => {
                cleaned_data.insert(field.name.clone(), value);
            }
            Err(field_errors) => {
                errors.insert(field.name.clone(), field_errors);
            }
        }
    }
}

/// Runs the full pipeline and returns the errors as sorted
/// `(field_name, messages)` pairs.
pub async fn full_clean(form: &mut dyn Form) -> Result<(), Vec<(String, Vec<String>)>> {
    if form.is_valid().await {
        Ok(())
    } else {
        let mut errors: Vec<(String, Vec<String>)> = form
            .errors()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        errors.sort_by(|a, b| a.0.cmp(&b.0));
        Err(errors)
    }
}
