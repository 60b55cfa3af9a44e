//! The persisted version table.
//!
//! One row is written per applied file: `(path, version, applied_at)` keyed on
//! `(path, version)`. Rows are only ever inserted; nothing here updates or
//! deletes them.

use pathmigrate_backends::{Dialect, Executor, Value};
use pathmigrate_core::PathMigrateResult;

use crate::version::INITIAL_VERSION;

/// Access to the version table of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionStore {
    table: String,
    schema: String,
}

impl VersionStore {
    /// Creates a store for `table`, qualified with `schema` when non-empty.
    ///
    /// Both names are interpolated into SQL and must already be sanitized.
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            schema: schema.into(),
        }
    }

    /// Returns the (possibly schema-qualified) table name.
    pub fn table_name(&self) -> String {
        if self.schema.is_empty() {
            self.table.clone()
        } else {
            format!("{}.{}", self.schema, self.table)
        }
    }

    /// Switches `search_path` to the configured schema for the current
    /// transaction. Returns whether a statement was issued.
    pub async fn set_schema<E>(&self, executor: &E) -> PathMigrateResult<bool>
    where
        E: Executor + ?Sized,
    {
        if self.schema.is_empty() || !executor.dialect().supports_search_path() {
            return Ok(false);
        }
        executor
            .execute_batch(&format!("SET LOCAL search_path = {}", self.schema))
            .await?;
        Ok(true)
    }

    /// Creates the version table if it does not exist.
    pub async fn ensure_table<E>(&self, executor: &E) -> PathMigrateResult<()>
    where
        E: Executor + ?Sized,
    {
        executor
            .execute_batch(&self.create_table_sql(executor.dialect()))
            .await
    }

    /// Returns the highest version applied at `path`, or `0` if none.
    pub async fn last_version<E>(&self, executor: &E, path: &str) -> PathMigrateResult<i64>
    where
        E: Executor + ?Sized,
    {
        let sql = format!(
            "SELECT MAX(version) AS version FROM {} WHERE path = {}",
            self.table_name(),
            executor.dialect().placeholder(1)
        );
        let row = executor.query_one(&sql, &[Value::from(path)]).await?;
        Ok(row.get::<Option<i64>>("version")?.unwrap_or(INITIAL_VERSION))
    }

    /// Takes the exclusive, transaction-scoped lock on the version table.
    ///
    /// Returns whether a lock statement was issued. SQLite has no table locks;
    /// its `BEGIN IMMEDIATE` already holds the database write lock.
    pub async fn lock<E>(&self, executor: &E) -> PathMigrateResult<bool>
    where
        E: Executor + ?Sized,
    {
        if !executor.dialect().supports_table_lock() {
            return Ok(false);
        }
        executor
            .execute_batch(&format!(
                "LOCK TABLE {} IN ACCESS EXCLUSIVE MODE",
                self.table_name()
            ))
            .await?;
        Ok(true)
    }

    /// Records `version` as applied at `path`.
    pub async fn insert<E>(&self, executor: &E, path: &str, version: i64) -> PathMigrateResult<()>
    where
        E: Executor + ?Sized,
    {
        let dialect = executor.dialect();
        let sql = format!(
            "INSERT INTO {} (path, version) VALUES ({}, {})",
            self.table_name(),
            dialect.placeholder(1),
            dialect.placeholder(2)
        );
        executor
            .execute(&sql, &[Value::from(path), Value::Int(version)])
            .await?;
        Ok(())
    }

    fn create_table_sql(&self, dialect: Dialect) -> String {
        let table = self.table_name();
        match dialect {
            Dialect::Postgres => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n    \
                 path VARCHAR(1000) NOT NULL DEFAULT '/',\n    \
                 version BIGINT NOT NULL,\n    \
                 applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),\n    \
                 PRIMARY KEY (path, version)\n)"
            ),
            Dialect::Sqlite => format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n    \
                 path TEXT NOT NULL DEFAULT '/',\n    \
                 version INTEGER NOT NULL,\n    \
                 applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,\n    \
                 PRIMARY KEY (path, version)\n)"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pathmigrate_backends::Row;
    use pathmigrate_core::MigrateError;
    use std::sync::Mutex;

    /// Records statements and answers version lookups with a fixed value.
    struct Recorder {
        dialect: Dialect,
        max_version: Value,
        log: Mutex<Vec<(String, Vec<Value>)>>,
    }

    impl Recorder {
        fn new(dialect: Dialect, max_version: Value) -> Self {
            Self {
                dialect,
                max_version,
                log: Mutex::new(Vec::new()),
            }
        }

        fn statements(&self) -> Vec<String> {
            self.log.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
        }
    }

    #[async_trait::async_trait]
    impl Executor for Recorder {
        fn dialect(&self) -> Dialect {
            self.dialect
        }

        async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, MigrateError> {
            self.log.lock().unwrap().push((sql.to_string(), params.to_vec()));
            Ok(1)
        }

        async fn execute_batch(&self, sql: &str) -> Result<(), MigrateError> {
            self.log.lock().unwrap().push((sql.to_string(), Vec::new()));
            Ok(())
        }

        async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Row, MigrateError> {
            self.log.lock().unwrap().push((sql.to_string(), params.to_vec()));
            Ok(Row::new(vec!["version".into()], vec![self.max_version.clone()]))
        }
    }

    #[test]
    fn test_table_name() {
        assert_eq!(VersionStore::new("", "migration").table_name(), "migration");
        assert_eq!(VersionStore::new("tenant", "migration").table_name(), "tenant.migration");
    }

    #[test]
    fn test_create_table_sql_postgres() {
        let sql = VersionStore::new("s", "m").create_table_sql(Dialect::Postgres);
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS s.m ("));
        assert!(sql.contains("path VARCHAR(1000) NOT NULL DEFAULT '/'"));
        assert!(sql.contains("version BIGINT NOT NULL"));
        assert!(sql.contains("applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()"));
        assert!(sql.contains("PRIMARY KEY (path, version)"));
    }

    #[tokio::test]
    async fn test_last_version_null_is_zero() {
        let exec = Recorder::new(Dialect::Postgres, Value::Null);
        let store = VersionStore::new("", "migration");
        assert_eq!(store.last_version(&exec, "/test").await.unwrap(), 0);

        let log = exec.log.lock().unwrap();
        assert_eq!(
            log[0].0,
            "SELECT MAX(version) AS version FROM migration WHERE path = $1"
        );
        assert_eq!(log[0].1, vec![Value::from("/test")]);
    }

    #[tokio::test]
    async fn test_last_version_value() {
        let exec = Recorder::new(Dialect::Sqlite, Value::Int(21));
        let store = VersionStore::new("", "migration");
        assert_eq!(store.last_version(&exec, "/").await.unwrap(), 21);
        assert!(exec.statements()[0].ends_with("WHERE path = ?1"));
    }

    #[tokio::test]
    async fn test_postgres_lock_and_search_path() {
        let exec = Recorder::new(Dialect::Postgres, Value::Null);
        let store = VersionStore::new("tenant", "migration");
        assert!(store.set_schema(&exec).await.unwrap());
        assert!(store.lock(&exec).await.unwrap());
        assert_eq!(
            exec.statements(),
            vec![
                "SET LOCAL search_path = tenant".to_string(),
                "LOCK TABLE tenant.migration IN ACCESS EXCLUSIVE MODE".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_schema_issues_nothing() {
        let exec = Recorder::new(Dialect::Postgres, Value::Null);
        assert!(!VersionStore::new("", "migration").set_schema(&exec).await.unwrap());
        assert!(exec.statements().is_empty());
    }

    #[tokio::test]
    async fn test_sqlite_skips_lock_and_search_path() {
        let exec = Recorder::new(Dialect::Sqlite, Value::Null);
        let store = VersionStore::new("main", "migration");
        assert!(!store.set_schema(&exec).await.unwrap());
        assert!(!store.lock(&exec).await.unwrap());
        assert!(exec.statements().is_empty());
    }

    #[tokio::test]
    async fn test_insert_binds_path_and_version() {
        let exec = Recorder::new(Dialect::Postgres, Value::Null);
        VersionStore::new("", "migration")
            .insert(&exec, "/test/inner", 3)
            .await
            .unwrap();

        let log = exec.log.lock().unwrap();
        assert_eq!(log[0].0, "INSERT INTO migration (path, version) VALUES ($1, $2)");
        assert_eq!(log[0].1, vec![Value::from("/test/inner"), Value::Int(3)]);
    }
}
