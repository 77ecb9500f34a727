//! Search parameters: query text, page size and the non-vouched filter.
//!
//! The page size is tolerant. Anything that is not a positive whole number
//! falls back to the configured default instead of failing the search.

use std::collections::HashMap;

use async_trait::async_trait;
use phonebook_core::Settings;
use phonebook_db::Value;
use phonebook_forms::{BaseForm, Form, FormData, FormFieldDef, FormFieldType, Warning, Widget};
use serde::Serialize;

/// A validated search request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchQuery {
    pub q: String,
    pub limit: usize,
    pub nonvouched_only: bool,
}

/// Cleans a submitted page size.
///
/// Absent or empty input yields `default` silently. Input that is not made
/// only of ASCII digits, does not fit a `usize`, or is below 1 yields
/// `default` with a warning.
///
/// ```
/// use phonebook::search::clean_limit;
///
/// assert_eq!(clean_limit(Some("50"), 20).0, 50);
/// assert_eq!(clean_limit(Some("0"), 20).0, 20);
/// assert!(clean_limit(None, 20).1.is_none());
/// ```
pub fn clean_limit(raw: Option<&str>, default: usize) -> (usize, Option<Warning>) {
    let raw = raw.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return (default, None);
    }

    let parsed = raw
        .bytes()
        .all(|b| b.is_ascii_digit())
        .then(|| raw.parse::<usize>().ok())
        .flatten()
        .filter(|n| *n >= 1);

    parsed.map_or_else(
        || {
            let warning = Warning::new(
                "limit",
                format!("'{raw}' is not a positive whole number, using {default}"),
            );
            (default, Some(warning))
        },
        |n| (n, None),
    )
}

/// The search form: `q` (required), `limit` and `nonvouched_only`.
pub struct SearchForm {
    inner: BaseForm,
    default_limit: usize,
    limit: Option<usize>,
}

impl SearchForm {
    /// Creates a search form using the configured page size as default.
    pub fn new(settings: &Settings) -> Self {
        Self {
            inner: BaseForm::new(vec![
                FormFieldDef::text("q").widget(Widget::HiddenInput),
                FormFieldDef::text("limit")
                    .required(false)
                    .widget(Widget::HiddenInput),
                FormFieldDef::new("nonvouched_only", FormFieldType::Boolean).required(false),
            ]),
            default_limit: settings.pagination_limit,
            limit: None,
        }
    }

    /// Returns the warnings produced by the last validation.
    pub fn warnings(&self) -> &[Warning] {
        self.inner.warnings()
    }

    /// Returns the validated query, or `None` if the form is not valid.
    pub fn query(&self) -> Option<SearchQuery> {
        let limit = self.limit?;
        Some(SearchQuery {
            q: self.inner.cleaned_str("q")?.to_string(),
            limit,
            nonvouched_only: self.inner.cleaned_bool("nonvouched_only"),
        })
    }
}

#[async_trait]
impl Form for SearchForm {
    fn fields(&self) -> &[FormFieldDef] {
        self.inner.fields()
    }

    fn bind(&mut self, data: &FormData) {
        self.inner.bind(data);
        self.limit = None;
    }

    fn is_bound(&self) -> bool {
        self.inner.is_bound()
    }

    async fn is_valid(&mut self) -> bool {
        self.limit = None;
        let valid = self.inner.is_valid().await;

        if self.inner.cleaned_data().contains_key("limit") {
            let (limit, warning) = clean_limit(self.inner.cleaned_str("limit"), self.default_limit);
            if let Some(warning) = warning {
                self.inner.add_warning(warning);
            }
            self.inner.set_cleaned("limit", Value::String(limit.to_string()));
            self.limit = Some(limit);
        }

        if !valid {
            self.limit = None;
        }
        valid
    }

    fn errors(&self) -> &HashMap<String, Vec<String>> {
        self.inner.errors()
    }

    fn cleaned_data(&self) -> &HashMap<String, Value> {
        self.inner.cleaned_data()
    }
}
