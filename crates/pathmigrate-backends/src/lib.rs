//! # pathmigrate-backends
//!
//! The executor contract the migration engine runs against, plus concrete
//! backends for the supported database engines.
//!
//! Supported backends:
//! - `PostgreSQL` (feature `postgres`)
//! - `SQLite` (feature `sqlite`)

pub mod base;
pub mod value;

#[cfg(feature = "postgres")]
pub mod postgresql;
#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use base::{DatabaseBackend, DatabaseConfig, Dialect, Executor};
pub use value::{FromValue, Row, Value};

#[cfg(feature = "postgres")]
pub use postgresql::PostgresBackend;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteBackend;
