//! Uploaded files and the complete submission a form binds to.

use std::collections::HashMap;

use crate::querydict::QueryDict;

/// An uploaded file from a multipart form submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// The original filename as provided by the client.
    pub name: String,
    /// The MIME content type claimed by the client.
    pub content_type: String,
    /// The size of the file content in bytes.
    pub size: usize,
    /// The raw file content.
    pub content: Vec<u8>,
}

impl UploadedFile {
    /// Creates an uploaded file; `size` is taken from the content.
    pub fn new(
        name: impl Into<String>,
        content_type: impl Into<String>,
        content: Vec<u8>,
    ) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            size: content.len(),
            content,
        }
    }
}

/// Everything a client submitted: string fields and uploaded files.
#[derive(Debug, Clone, Default)]
pub struct FormData {
    /// Regular form fields.
    pub fields: QueryDict,
    /// Uploaded files by field name.
    pub files: HashMap<String, UploadedFile>,
}

impl FormData {
    /// Creates an empty submission.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a submission from a url-encoded body, without files.
    pub fn from_query(query_string: &str) -> Self {
        Self {
            fields: QueryDict::parse(query_string),
            files: HashMap::new(),
        }
    }

    /// Adds a string field value.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.append(name, value);
        self
    }

    /// Attaches an uploaded file.
    #[must_use]
    pub fn with_file(mut self, name: impl Into<String>, file: UploadedFile) -> Self {
        self.files.insert(name.into(), file);
        self
    }

    /// Returns the last submitted value of a string field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name)
    }

    /// Returns the uploaded file for a field.
    pub fn file(&self, name: &str) -> Option<&UploadedFile> {
        self.files.get(name)
    }
}

impl From<QueryDict> for FormData {
    fn from(fields: QueryDict) -> Self {
        Self {
            fields,
            files: HashMap::new(),
        }
    }
}
