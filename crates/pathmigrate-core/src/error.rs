//! Core error types for pathmigrate.
//!
//! [`MigrateError`] covers the four failure families a migration run can hit:
//! reading the migration source, talking to the database, executing a
//! migration script, and being cancelled or timed out. Unparsable file names
//! are deliberately absent: such files are skipped, never reported.

use std::time::Duration;

use thiserror::Error;

/// The primary error type for pathmigrate.
///
/// Every variant is terminal for the run that produced it. Nothing in the
/// engine retries; a fresh top-level call is the only retry mechanism.
#[derive(Error, Debug)]
pub enum MigrateError {
    // ── Source errors ────────────────────────────────────────────────

    /// The requested path does not exist in the migration source.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The requested path exists but is a file where a directory was expected.
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// An I/O error occurred while reading the migration source.
    #[error("IO error at '{path}': {source}")]
    Io {
        /// The logical path being accessed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    // ── Database errors ──────────────────────────────────────────────

    /// A query expected exactly one row but found none.
    #[error("Object does not exist: {0}")]
    DoesNotExist(String),

    /// A query expected exactly one row but found several.
    #[error("Multiple objects returned when one expected: {0}")]
    MultipleObjectsReturned(String),

    /// A generic database error reported by the driver.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// An operational database error (connection failure, pool exhaustion, etc.).
    #[error("Operational error: {0}")]
    OperationalError(String),

    // ── Execution errors ─────────────────────────────────────────────

    /// A migration script failed against the database.
    #[error("migration '{path}' (version {version}) failed: {source}")]
    Execution {
        /// Full logical path of the offending file.
        path: String,
        /// The version the file would have recorded.
        version: i64,
        /// The driver error.
        #[source]
        source: Box<MigrateError>,
    },

    /// Rolling back after a failure failed as well.
    #[error("{error}, also rollback error: {rollback}")]
    RollbackFailed {
        /// The error that triggered the rollback.
        error: Box<MigrateError>,
        /// The error returned by the rollback itself.
        rollback: Box<MigrateError>,
    },

    // ── Cancellation ─────────────────────────────────────────────────

    /// The caller cancelled the run.
    #[error("Migration run cancelled")]
    Cancelled,

    /// The run exceeded its configured deadline.
    #[error("Migration run timed out after {0:?}")]
    Timeout(Duration),

    // ── Configuration ────────────────────────────────────────────────

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl MigrateError {
    /// Builds an [`MigrateError::Io`] for the given logical path.
    ///
    /// A `NotFound` kind is mapped onto [`MigrateError::NotFound`] so callers
    /// can match on it without inspecting the source.
    pub fn from_io(path: impl Into<String>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }

    /// Returns `true` for errors raised while reading the migration source.
    pub const fn is_source_error(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_) | Self::NotADirectory(_) | Self::Io { .. }
        )
    }

    /// Returns `true` when the run stopped because of cancellation or a deadline.
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Timeout(_))
    }

    /// Returns the innermost error, unwrapping [`MigrateError::Execution`]
    /// and [`MigrateError::RollbackFailed`] layers.
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Execution { source, .. } => source.root_cause(),
            Self::RollbackFailed { error, .. } => error.root_cause(),
            other => other,
        }
    }
}

/// A convenience type alias for `Result<T, MigrateError>`.
pub type PathMigrateResult<T> = Result<T, MigrateError>;
