//! SQLite database backend using `rusqlite`.
//!
//! This module provides the [`SqliteBackend`] which implements the
//! [`DatabaseBackend`](crate::base::DatabaseBackend) trait using `rusqlite`
//! wrapped in `tokio::task::spawn_blocking` for async compatibility.
//!
//! Features:
//! - WAL mode enabled for file-based databases
//! - In-memory database support via `:memory:` path (great for testing)
//! - Transactions open with `BEGIN IMMEDIATE`, so a second writer waits on
//!   the busy timeout instead of interleaving with a running migration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pathmigrate_core::MigrateError;
use tokio::sync::Mutex;

use crate::base::{DatabaseBackend, Dialect, Executor};
use crate::value::{Row, Value};

/// How long a connection waits for another writer before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// A SQLite database backend.
///
/// Uses `rusqlite` for database access with a `Mutex`-guarded single
/// connection. All operations are run via `tokio::task::spawn_blocking` to
/// avoid blocking the async runtime.
pub struct SqliteBackend {
    /// The path to the database file (or ":memory:").
    path: PathBuf,
    /// The connection, guarded by an async mutex.
    conn: Arc<Mutex<rusqlite::Connection>>,
}

impl SqliteBackend {
    /// Opens a new SQLite database at the given path.
    ///
    /// If the path is `:memory:`, an in-memory database is created.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, MigrateError> {
        Self::open_with_busy_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Opens a database with an explicit busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or configured.
    pub fn open_with_busy_timeout(
        path: impl Into<PathBuf>,
        busy_timeout: Duration,
    ) -> Result<Self, MigrateError> {
        let path = path.into();
        let in_memory = path.to_str() == Some(":memory:");
        let conn = if in_memory {
            rusqlite::Connection::open_in_memory()
        } else {
            rusqlite::Connection::open(&path)
        }
        .map_err(|e| MigrateError::OperationalError(format!("SQLite open failed: {e}")))?;

        conn.busy_timeout(busy_timeout).map_err(|e| {
            MigrateError::OperationalError(format!("Failed to set busy timeout: {e}"))
        })?;

        if !in_memory {
            conn.execute_batch("PRAGMA journal_mode=WAL;").map_err(|e| {
                MigrateError::OperationalError(format!("Failed to set pragmas: {e}"))
            })?;
        }

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory database (convenience constructor).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn memory() -> Result<Self, MigrateError> {
        Self::open(":memory:")
    }

    /// Returns the database file path.
    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Runs `f` against the connection on the blocking thread pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, MigrateError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, MigrateError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let conn = conn.blocking_lock();
            f(&conn)
        })
        .await
        .map_err(|e| MigrateError::DatabaseError(format!("Task join error: {e}")))?
    }

    /// Binds `Value`s to a `rusqlite` statement.
    fn bind_params(
        stmt: &mut rusqlite::Statement<'_>,
        params: &[Value],
    ) -> Result<(), MigrateError> {
        for (i, param) in params.iter().enumerate() {
            let idx = i + 1;
            match param {
                Value::Null => stmt.raw_bind_parameter(idx, rusqlite::types::Null),
                Value::Bool(b) => stmt.raw_bind_parameter(idx, b),
                Value::Int(v) => stmt.raw_bind_parameter(idx, v),
                Value::Float(v) => stmt.raw_bind_parameter(idx, v),
                Value::String(s) => stmt.raw_bind_parameter(idx, s.as_str()),
                Value::DateTimeTz(dt) => stmt.raw_bind_parameter(idx, dt.to_rfc3339().as_str()),
            }
            .map_err(|e| MigrateError::DatabaseError(format!("Bind error: {e}")))?;
        }
        Ok(())
    }

    /// Converts a `rusqlite::Row` to our generic `Row`.
    fn convert_row(sqlite_row: &rusqlite::Row<'_>, column_names: &[String]) -> Row {
        let values: Vec<Value> = (0..column_names.len())
            .map(|i| {
                let val_ref = sqlite_row
                    .get_ref(i)
                    .unwrap_or(rusqlite::types::ValueRef::Null);
                match val_ref {
                    rusqlite::types::ValueRef::Null => Value::Null,
                    rusqlite::types::ValueRef::Integer(v) => Value::Int(v),
                    rusqlite::types::ValueRef::Real(v) => Value::Float(v),
                    rusqlite::types::ValueRef::Text(b) | rusqlite::types::ValueRef::Blob(b) => {
                        Value::String(String::from_utf8_lossy(b).to_string())
                    }
                }
            })
            .collect();

        Row::new(column_names.to_vec(), values)
    }
}

#[async_trait::async_trait]
impl Executor for SqliteBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, MigrateError> {
        let sql = sql.to_string();
        let params = params.to_vec();

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| MigrateError::DatabaseError(format!("{e}")))?;
            Self::bind_params(&mut stmt, &params)?;
            let count = stmt
                .raw_execute()
                .map_err(|e| MigrateError::DatabaseError(format!("{e}")))?;
            Ok(count as u64)
        })
        .await
    }

    async fn execute_batch(&self, sql: &str) -> Result<(), MigrateError> {
        let sql = sql.to_string();

        self.with_conn(move |conn| {
            conn.execute_batch(&sql)
                .map_err(|e| MigrateError::DatabaseError(format!("{e}")))
        })
        .await
    }

    async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Row, MigrateError> {
        let sql = sql.to_string();
        let params = params.to_vec();

        let mut rows = self
            .with_conn(move |conn| {
                let mut stmt = conn
                    .prepare(&sql)
                    .map_err(|e| MigrateError::DatabaseError(format!("{e}")))?;

                let column_names: Vec<String> = stmt
                    .column_names()
                    .into_iter()
                    .map(String::from)
                    .collect();

                Self::bind_params(&mut stmt, &params)?;

                let mut raw_rows = stmt.raw_query();
                let mut rows = Vec::new();
                while let Some(row) = raw_rows
                    .next()
                    .map_err(|e| MigrateError::DatabaseError(format!("{e}")))?
                {
                    rows.push(Self::convert_row(row, &column_names));
                }

                Ok(rows)
            })
            .await?;

        match rows.len() {
            0 => Err(MigrateError::DoesNotExist("No rows returned".to_string())),
            1 => Ok(rows.remove(0)),
            n => Err(MigrateError::MultipleObjectsReturned(format!(
                "Expected 1 row, got {n}"
            ))),
        }
    }
}

#[async_trait::async_trait]
impl DatabaseBackend for SqliteBackend {
    fn vendor(&self) -> &str {
        "sqlite"
    }

    async fn begin_transaction(&self) -> Result<(), MigrateError> {
        self.execute_batch("BEGIN IMMEDIATE").await
    }

    async fn commit(&self) -> Result<(), MigrateError> {
        self.execute_batch("COMMIT").await
    }

    async fn rollback(&self) -> Result<(), MigrateError> {
        self.execute_batch("ROLLBACK").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sqlite_memory_open() {
        let backend = SqliteBackend::memory().unwrap();
        assert_eq!(backend.vendor(), "sqlite");
        assert_eq!(backend.dialect(), Dialect::Sqlite);
    }

    #[tokio::test]
    async fn test_sqlite_insert_and_query_one() {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute("CREATE TABLE test (id INTEGER PRIMARY KEY, val TEXT)", &[])
            .await
            .unwrap();

        let affected = backend
            .execute("INSERT INTO test (val) VALUES (?1)", &[Value::from("hello")])
            .await
            .unwrap();
        assert_eq!(affected, 1);

        let row = backend
            .query_one("SELECT val FROM test WHERE id = ?1", &[Value::from(1)])
            .await
            .unwrap();
        assert_eq!(row.get::<String>("val").unwrap(), "hello");
    }

    #[tokio::test]
    async fn test_sqlite_query_one_not_found() {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute("CREATE TABLE test (id INTEGER PRIMARY KEY)", &[])
            .await
            .unwrap();

        let result = backend
            .query_one("SELECT id FROM test WHERE id = ?1", &[Value::from(999)])
            .await;
        assert!(matches!(result, Err(MigrateError::DoesNotExist(_))));
    }

    #[tokio::test]
    async fn test_sqlite_query_one_multiple() {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute_batch(
                "CREATE TABLE test (val TEXT); INSERT INTO test VALUES ('a'); INSERT INTO test VALUES ('b');",
            )
            .await
            .unwrap();

        let result = backend.query_one("SELECT val FROM test", &[]).await;
        assert!(matches!(result, Err(MigrateError::MultipleObjectsReturned(_))));
    }

    #[tokio::test]
    async fn test_sqlite_max_of_empty_is_null() {
        let backend = SqliteBackend::memory().unwrap();
        backend
            .execute("CREATE TABLE v (version INTEGER)", &[])
            .await
            .unwrap();

        let row = backend
            .query_one("SELECT MAX(version) AS version FROM v", &[])
            .await
            .unwrap();
        assert_eq!(row.get::<Option<i64>>("version").unwrap(), None);
    }

    #[tokio::test]
    async fn test_sqlite_execute_batch_error() {
        let backend = SqliteBackend::memory().unwrap();
        let result = backend.execute_batch("CREATE TABLE broken (").await;
        assert!(matches!(result, Err(MigrateError::DatabaseError(_))));
    }

    #[tokio::test]
    async fn test_sqlite_rollback_discards_ddl() {
        let backend = SqliteBackend::memory().unwrap();
        backend.begin_transaction().await.unwrap();
        backend
            .execute_batch("CREATE TABLE temp_t (id INTEGER)")
            .await
            .unwrap();
        backend.rollback().await.unwrap();

        let row = backend
            .query_one(
                "SELECT COUNT(*) AS n FROM sqlite_master WHERE name = 'temp_t'",
                &[],
            )
            .await
            .unwrap();
        assert_eq!(row.get::<i64>("n").unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sqlite_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("migrate.db");
        let backend = SqliteBackend::open(&path).unwrap();
        assert_eq!(backend.path(), &path);

        backend.begin_transaction().await.unwrap();
        backend
            .execute_batch("CREATE TABLE kept (id INTEGER)")
            .await
            .unwrap();
        backend.commit().await.unwrap();

        let reopened = SqliteBackend::open(&path).unwrap();
        let row = reopened
            .query_one(
                "SELECT COUNT(*) AS n FROM sqlite_master WHERE name = 'kept'",
                &[],
            )
            .await
            .unwrap();
        assert_eq!(row.get::<i64>("n").unwrap(), 1);
    }
}
