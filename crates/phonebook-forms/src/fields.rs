//! Form field definitions and type-level validation.
//!
//! Each [`FormFieldDef`] describes a single form field: its type, widget,
//! label and error messages. The [`FormFieldType`] enum carries the
//! type-specific parsing rules applied by [`clean_field_value`].
//!
//! Only the field kinds the phonebook forms use are supported.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use phonebook_db::Value;
use regex::Regex;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+\-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,}$").expect("valid regex")
});

static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^https?://[^\s/$.?#].[^\s]*$").expect("valid regex"));

/// How a field is rendered. Only informs templates; cleaning ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Widget {
    TextInput,
    Textarea,
    HiddenInput,
    CheckboxInput,
    Select,
    FileInput,
    EmailInput,
    UrlInput,
}

/// Defines the type of a form field, including type-specific parameters.
#[derive(Debug, Clone)]
pub enum FormFieldType {
    /// A character (string) field.
    Char {
        /// Minimum length (characters).
        min_length: Option<usize>,
        /// Maximum length (characters).
        max_length: Option<usize>,
        /// Whether to strip leading/trailing whitespace.
        strip: bool,
    },
    /// A checkbox. An absent value cleans to `false`.
    Boolean,
    /// An email address field.
    Email,
    /// A URL field. A value without a scheme gets `http://` prepended.
    Url,
    /// A single-choice field.
    Choice {
        /// Available choices as `(value, display_label)` pairs.
        choices: Vec<(String, String)>,
        /// When `false`, values outside `choices` pass through unchanged and
        /// are left to the form's own cleaner.
        strict: bool,
    },
    /// An uploaded image. The bound raw value is the file name; the bytes
    /// are reached through [`BaseForm::file`](crate::form::BaseForm::file).
    Image,
}

/// Complete definition of a form field.
#[derive(Debug, Clone)]
pub struct FormFieldDef {
    /// The field name (HTML name attribute).
    pub name: String,
    /// The field type, controlling parsing and coercion.
    pub field_type: FormFieldType,
    /// Whether this field is required.
    pub required: bool,
    /// Human-readable label.
    pub label: String,
    /// The widget used for rendering.
    pub widget: Widget,
    /// Custom error messages keyed by error code ("required", "invalid").
    pub error_messages: HashMap<String, String>,
}

impl FormFieldDef {
    /// Creates a required field with the default widget for its type.
    pub fn new(name: impl Into<String>, field_type: FormFieldType) -> Self {
        let name = name.into();
        let widget = default_widget_for_field_type(&field_type);
        let label = name.replace('_', " ");
        Self {
            name,
            field_type,
            required: true,
            label,
            widget,
            error_messages: HashMap::new(),
        }
    }

    /// Shorthand for a stripped [`FormFieldType::Char`] without length limits.
    pub fn text(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FormFieldType::Char {
                min_length: None,
                max_length: None,
                strip: true,
            },
        )
    }

    /// Sets whether this field is required.
    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets the label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Sets the widget.
    #[must_use]
    pub fn widget(mut self, widget: Widget) -> Self {
        self.widget = widget;
        self
    }

    /// Overrides the error message for a code.
    #[must_use]
    pub fn error_message(mut self, code: impl Into<String>, msg: impl Into<String>) -> Self {
        self.error_messages.insert(code.into(), msg.into());
        self
    }

    fn message(&self, code: &str, default: &str) -> String {
        self.error_messages
            .get(code)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }
}

/// Returns the default widget for a field type.
pub const fn default_widget_for_field_type(field_type: &FormFieldType) -> Widget {
    match field_type {
        FormFieldType::Char { .. } => Widget::TextInput,
        FormFieldType::Boolean => Widget::CheckboxInput,
        FormFieldType::Email => Widget::EmailInput,
        FormFieldType::Url => Widget::UrlInput,
        FormFieldType::Choice { .. } => Widget::Select,
        FormFieldType::Image => Widget::FileInput,
    }
}

/// Cleans (validates and coerces) a raw form input string into a `Value`.
///
/// 1. Strips `Char` input when the field asks for it
/// 2. Required check on the (stripped) value
/// 3. Type coercion and type-specific constraints
///
/// Empty optional text fields clean to an empty string and empty optional
/// fields of other types to `Null`.
pub fn clean_field_value(field: &FormFieldDef, raw: Option<&str>) -> Result<Value, Vec<String>> {
    if matches!(field.field_type, FormFieldType::Boolean) {
        let checked = raw.is_some_and(|s| {
            !matches!(s.trim().to_lowercase().as_str(), "" | "false" | "0" | "off" | "no")
        });
        if field.required && !checked {
            return Err(vec![field.message("required", "This field is required.")]);
        }
        return Ok(Value::Bool(checked));
    }

    let raw_str = match (&field.field_type, raw) {
        (FormFieldType::Char { strip: true, .. } | FormFieldType::Email | FormFieldType::Url, Some(s)) => {
            s.trim()
        }
        (_, Some(s)) => s,
        (_, None) => "",
    };

    if raw_str.is_empty() {
        if field.required {
            return Err(vec![field.message("required", "This field is required.")]);
        }
        return Ok(match field.field_type {
            FormFieldType::Char { .. } => Value::String(String::new()),
            _ => Value::Null,
        });
    }

    let mut errors = Vec::new();

    let value = match &field.field_type {
        FormFieldType::Char {
            min_length,
            max_length,
            ..
        } => {
            let len = raw_str.chars().count();
            if let Some(min) = min_length {
                if len < *min {
                    errors.push(format!(
                        "Ensure this value has at least {min} characters (it has {len})."
                    ));
                }
            }
            if let Some(max) = max_length {
                if len > *max {
                    errors.push(format!(
                        "Ensure this value has at most {max} characters (it has {len})."
                    ));
                }
            }
            Value::String(raw_str.to_string())
        }

        FormFieldType::Email => {
            if !EMAIL_RE.is_match(raw_str) {
                errors.push(field.message("invalid", "Enter a valid email address."));
            }
            Value::String(raw_str.to_string())
        }

        FormFieldType::Url => {
            let url = if raw_str.contains("://") {
                raw_str.to_string()
            } else {
                format!("http://{raw_str}")
            };
            if !URL_RE.is_match(&url) {
                errors.push(field.message("invalid", "Enter a valid URL."));
            }
            Value::String(url)
        }

        FormFieldType::Choice { choices, strict } => {
            if *strict && !choices.iter().any(|(v, _)| v == raw_str) {
                errors.push(format!(
                    "Select a valid choice. {raw_str} is not one of the available choices."
                ));
            }
            Value::String(raw_str.to_string())
        }

        FormFieldType::Image => Value::String(raw_str.to_string()),

        FormFieldType::Boolean => unreachable!("handled above"),
    };

    if errors.is_empty() {
        Ok(value)
    } else {
        Err(errors)
    }
}
