//! Logging integration for pathmigrate.
//!
//! The engine only emits [`tracing`] events with key-value fields; installing a
//! subscriber is left to the embedding application. [`setup_logging`] is a
//! convenience for applications that have none.

use crate::settings::Settings;

/// Sets up the global tracing subscriber based on the given settings.
///
/// The log level is read from `settings.log_level`. In debug mode a pretty,
/// human-readable format is used; otherwise a structured JSON format is used.
/// Installing is a no-op when a global subscriber already exists.
pub fn setup_logging(settings: &Settings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(&settings.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    if settings.debug {
        fmt::Subscriber::builder()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
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

/// Creates the tracing span wrapping one migration run.
///
/// # Examples
///
/// ```
/// use pathmigrate_core::logging::run_span;
///
/// let span = run_span("migration");
/// let _guard = span.enter();
/// tracing::info!("migrating");
/// ```
pub fn run_span(table: &str) -> tracing::Span {
    tracing::info_span!("migrate", table = table)
}
