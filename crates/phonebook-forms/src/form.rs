//! Form trait and `BaseForm` implementation.
//!
//! The [`Form`] trait is the core abstraction for all form types. Validation
//! is async so that form-level cleaning can reach the store (uniqueness
//! checks, lookups) without blocking.
//!
//! [`BaseForm`] is a general-purpose implementation built from a list of
//! field definitions. Application forms wrap one and run their own field
//! cleaners on top of it.

use std::collections::HashMap;

use async_trait::async_trait;
use phonebook_db::Value;

use crate::fields::{FormFieldDef, FormFieldType};
use crate::upload::{FormData, UploadedFile};
use crate::validation::{self, Warning};

/// The core form trait.
///
/// # Async Design
///
/// `is_valid()` and `clean()` are async because cross-field validation
/// may need database access. All implementations must be `Send + Sync` so
/// forms can move across tasks.
#[async_trait]
pub trait Form: Send + Sync {
    /// Returns the form's field definitions.
    fn fields(&self) -> &[FormFieldDef];

    /// Binds submitted data to this form, discarding earlier results.
    fn bind(&mut self, data: &FormData);

    /// Returns `true` if this form has been bound to data.
    fn is_bound(&self) -> bool;

    /// Validates the form. Returns `true` if valid.
    ///
    /// After calling this, `errors()` and `cleaned_data()` are populated.
    /// An unbound form is never valid.
    async fn is_valid(&mut self) -> bool;

    /// Returns per-field validation errors.
    fn errors(&self) -> &HashMap<String, Vec<String>>;

    /// Returns the cleaned (validated and coerced) data.
    fn cleaned_data(&self) -> &HashMap<String, Value>;

    /// Cross-field validation hook. The default does nothing.
    async fn clean(&self) -> Result<(), HashMap<String, Vec<String>>> {
        Ok(())
    }
}

/// A general-purpose form implementation.
pub struct BaseForm {
    field_defs: Vec<FormFieldDef>,
    bound: bool,
    raw_data: HashMap<String, Option<String>>,
    files: HashMap<String, UploadedFile>,
    errors: HashMap<String, Vec<String>>,
    cleaned_data: HashMap<String, Value>,
    warnings: Vec<Warning>,
}

impl BaseForm {
    /// Creates a new `BaseForm` with the given field definitions.
    pub fn new(fields: Vec<FormFieldDef>) -> Self {
        Self {
            field_defs: fields,
            bound: false,
            raw_data: HashMap::new(),
            files: HashMap::new(),
            errors: HashMap::new(),
            cleaned_data: HashMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Returns the field definition with this name.
    pub fn field(&self, name: &str) -> Option<&FormFieldDef> {
        self.field_defs.iter().find(|f| f.name == name)
    }

    /// Returns the uploaded file bound to an image field.
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }

    /// Records an error for a field and drops its cleaned value.
    pub fn add_error(&mut self, field: &str, message: impl Into<String>) {
        self.cleaned_data.remove(field);
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Replaces the cleaned value of a field.
    pub fn set_cleaned(&mut self, field: &str, value: Value) {
        self.cleaned_data.insert(field.to_string(), value);
    }

    /// Records a tolerant-cleaning warning.
    pub fn add_warning(&mut self, warning: Warning) {
        tracing::debug!(field = %warning.field, message = %warning.message, "form warning");
        self.warnings.push(warning);
    }

    /// Returns the warnings collected by the last validation.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Returns the cleaned value of a field as text, if it is a string.
    pub fn cleaned_str(&self, field: &str) -> Option<&str> {
        self.cleaned_data.get(field).and_then(Value::as_str)
    }

    /// Returns the cleaned value of a boolean field (`false` when absent).
    pub fn cleaned_bool(&self, field: &str) -> bool {
        self.cleaned_data
            .get(field)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

#[async_trait]
impl Form for BaseForm {
    fn fields(&self) -> &[FormFieldDef] {
        &self.field_defs
    }

    fn bind(&mut self, data: &FormData) {
        self.bound = true;
        self.raw_data.clear();
        self.files.clear();
        self.errors.clear();
        self.cleaned_data.clear();
        self.warnings.clear();

        for field in &self.field_defs {
            let value = if matches!(field.field_type, FormFieldType::Image) {
                data.file(&field.name).map(|file| {
                    self.files.insert(field.name.clone(), file.clone());
                    file.name.clone()
                })
            } else {
                data.field(&field.name).map(String::from)
            };
            self.raw_data.insert(field.name.clone(), value);
        }
    }

    fn is_bound(&self) -> bool {
        self.bound
    }

    async fn is_valid(&mut self) -> bool {
        if !self.bound {
            return false;
        }

        self.errors.clear();
        self.cleaned_data.clear();
        self.warnings.clear();

        validation::clean_fields(
            &self.field_defs,
            &self.raw_data,
            &mut self.cleaned_data,
            &mut self.errors,
        );

        if let Err(form_errors) = self.clean().await {
            for (key, msgs) in form_errors {
                self.errors.entry(key).or_default().extend(msgs);
            }
        }

        self.errors.is_empty()
    }

    fn errors(&self) -> &HashMap<String, Vec<String>> {
        &self.errors
    }

    fn cleaned_data(&self) -> &HashMap<String, Value> {
        &self.cleaned_data
    }
}
