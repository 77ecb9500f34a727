//! Multi-value dictionary for submitted form fields.
//!
//! A key may carry several values (repeated inputs, multi-selects). Like an
//! HTML form submission, [`QueryDict::get`] returns the last value for a key
//! and [`QueryDict::get_list`] returns all of them.

use std::collections::HashMap;

/// Submitted string fields, keyed by field name.
///
/// # Examples
///
/// ```
/// use phonebook_forms::QueryDict;
///
/// let qd = QueryDict::parse("groups=rust&groups=go&q=ada+lovelace");
/// assert_eq!(qd.get("groups"), Some("go"));
/// assert_eq!(qd.get_list("groups"), Some(&vec!["rust".to_string(), "go".to_string()]));
/// assert_eq!(qd.get("q"), Some("ada lovelace"));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryDict {
    data: HashMap<String, Vec<String>>,
}

impl QueryDict {
    /// Creates an empty `QueryDict`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses an `application/x-www-form-urlencoded` string.
    ///
    /// `+` decodes to a space and percent sequences are decoded as UTF-8
    /// (invalid sequences are replaced). A pair without `=` gets an empty
    /// value.
    pub fn parse(query_string: &str) -> Self {
        let mut qd = Self::new();
        for pair in query_string.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .unwrap_or((pair, ""));
            qd.append(percent_decode(key), percent_decode(value));
        }
        qd
    }

    /// Builder-style [`append`](Self::append).
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.append(key, value);
        self
    }

    /// Returns the last value for the given key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.data
            .get(key)
            .and_then(|values| values.last())
            .map(String::as_str)
    }

    /// Returns all values for the given key, in submission order.
    pub fn get_list(&self, key: &str) -> Option<&Vec<String>> {
        self.data.get(key)
    }

    /// Adds a value for the key, keeping earlier values.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.entry(key.into()).or_default().push(value.into());
    }

    /// Replaces every value for the key with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), vec![value.into()]);
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` when no keys are present.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if the key was submitted (even with an empty value).
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns an iterator over the keys.
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.data.keys()
    }

    /// Encodes the dictionary back into a query string, pairs sorted.
    pub fn urlencode(&self) -> String {
        let mut parts: Vec<String> = self
            .data
            .iter()
            .flat_map(|(key, values)| {
                values
                    .iter()
                    .map(move |value| format!("{}={}", percent_encode(key), percent_encode(value)))
            })
            .collect();
        parts.sort();
        parts.join("&")
    }
}

fn percent_decode(input: &str) -> String {
    let plus_decoded = input.replace('+', " ");
    percent_encoding::percent_decode_str(&plus_decoded)
        .decode_utf8_lossy()
        .into_owned()
}

fn percent_encode(input: &str) -> String {
    percent_encoding::utf8_percent_encode(input, percent_encoding::NON_ALPHANUMERIC).to_string()
}
