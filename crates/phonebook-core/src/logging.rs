//! Logging integration.
//!
//! Configures [`tracing`]-based logging from [`Settings`] and creates the
//! per-request span that form saves run inside.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The filter is read from `settings.log_level`. Debug mode uses a pretty,
/// human-readable format; otherwise logs are structured JSON. Installing a
/// second subscriber is a no-op.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .pretty()
            .try_init()
            .ok();
    } else {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .json()
            .try_init()
            .ok();
    }
}

/// Creates a tracing span for one request's form handling.
///
/// # Examples
///
/// ```
/// use phonebook_core::logging::request_span;
///
/// let span = request_span("abc-123", "u-42");
/// let _guard = span.enter();
/// tracing::info!("saving profile");
/// ```
pub fn request_span(request_id: &str, user: &str) -> tracing::Span {
    tracing::info_span!("request", id = request_id, user = user)
}
