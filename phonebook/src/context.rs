//! Per-request context handed to persistence operations.

use phonebook_db::User;
use uuid::Uuid;

/// Who is acting and under which request id.
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlates log lines of one request.
    pub request_id: String,
    /// The signed-in user whose profile is being edited.
    pub user: User,
}

impl RequestContext {
    /// Creates a context with a fresh random request id.
    pub fn new(user: User) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            user,
        }
    }

    /// Uses an id assigned upstream (e.g. from a request header).
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Returns the tracing span for work done on behalf of this request.
    pub fn span(&self) -> tracing::Span {
        phonebook_core::logging::request_span(&self.request_id, &self.user.unique_id)
    }
}
