//! Base executor traits and common types.
//!
//! This module defines the [`Executor`] trait the migration engine issues its
//! statements through, the [`DatabaseBackend`] trait adding transaction
//! control on top of it, and the [`Dialect`] used to render engine-specific SQL.

use pathmigrate_core::MigrateError;

use crate::value::{Row, Value};

/// The SQL dialect spoken by an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// PostgreSQL.
    Postgres,
    /// SQLite.
    Sqlite,
}

impl Dialect {
    /// Returns the placeholder for the 1-based parameter `n`.
    pub fn placeholder(self, n: usize) -> String {
        match self {
            Self::Postgres => format!("${n}"),
            Self::Sqlite => format!("?{n}"),
        }
    }

    /// Whether `LOCK TABLE ... IN ACCESS EXCLUSIVE MODE` is available.
    ///
    /// SQLite has no table locks; its backend opens transactions with
    /// `BEGIN IMMEDIATE`, which already holds the database write lock.
    pub const fn supports_table_lock(self) -> bool {
        matches!(self, Self::Postgres)
    }

    /// Whether a transaction-scoped `SET LOCAL search_path` is available.
    pub const fn supports_search_path(self) -> bool {
        matches!(self, Self::Postgres)
    }
}

/// Statement execution inside the caller's ambient transaction.
///
/// All methods are async because database operations are I/O-bound. Backends
/// built on synchronous drivers wrap their calls in `spawn_blocking`.
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Returns the dialect used to render SQL for this executor.
    fn dialect(&self) -> Dialect;

    /// Executes a single parameterized statement that does not return rows.
    ///
    /// Returns the number of rows affected.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, MigrateError>;

    /// Executes a script of one or more statements without parameters.
    async fn execute_batch(&self, sql: &str) -> Result<(), MigrateError>;

    /// Executes a SQL query and returns exactly one row.
    ///
    /// Returns [`MigrateError::DoesNotExist`] if no rows are returned, or
    /// [`MigrateError::MultipleObjectsReturned`] if more than one row is returned.
    async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Row, MigrateError>;
}

/// A database connection able to open and close the transaction a migration
/// run executes in.
#[async_trait::async_trait]
pub trait DatabaseBackend: Executor {
    /// Returns the vendor name (e.g., "postgresql", "sqlite").
    fn vendor(&self) -> &str;

    /// Begins a new database transaction.
    async fn begin_transaction(&self) -> Result<(), MigrateError>;

    /// Commits the current transaction.
    async fn commit(&self) -> Result<(), MigrateError>;

    /// Rolls back the current transaction.
    async fn rollback(&self) -> Result<(), MigrateError>;
}

/// Configuration for connecting to a database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// The dialect of the target database.
    pub dialect: Dialect,
    /// The database name or file path.
    pub name: String,
    /// The database host (for network-based backends).
    pub host: Option<String>,
    /// The database port.
    pub port: Option<u16>,
    /// The database user.
    pub user: Option<String>,
    /// The database password.
    pub password: Option<String>,
}

impl DatabaseConfig {
    /// Creates a configuration for an in-memory SQLite database.
    pub fn sqlite_memory() -> Self {
        Self::sqlite_file(":memory:")
    }

    /// Creates a configuration for a SQLite file database.
    pub fn sqlite_file(path: impl Into<String>) -> Self {
        Self {
            dialect: Dialect::Sqlite,
            name: path.into(),
            host: None,
            port: None,
            user: None,
            password: None,
        }
    }

    /// Creates a configuration for a PostgreSQL database.
    pub fn postgres(
        name: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            dialect: Dialect::Postgres,
            name: name.into(),
            host: Some(host.into()),
            port: Some(port),
            user: Some(user.into()),
            password: Some(password.into()),
        }
    }
}
