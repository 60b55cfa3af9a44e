//! PostgreSQL database backend using `tokio-postgres` and `deadpool-postgres`.
//!
//! A [`PostgresBackend`] checks one connection out of a pool and keeps it for
//! its whole lifetime, so `BEGIN`, every migration statement, and the final
//! `COMMIT`/`ROLLBACK` share a session. Returning the backend drops the
//! connection back into the pool.

use pathmigrate_core::MigrateError;

use crate::base::{DatabaseBackend, DatabaseConfig, Dialect, Executor};
use crate::value::{Row, Value};

/// A PostgreSQL database backend bound to one pooled connection.
pub struct PostgresBackend {
    client: deadpool_postgres::Object,
}

impl PostgresBackend {
    /// Checks a connection out of `pool`.
    ///
    /// # Errors
    ///
    /// Returns an error if no connection can be obtained.
    pub async fn from_pool(pool: &deadpool_postgres::Pool) -> Result<Self, MigrateError> {
        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::OperationalError(format!("Pool error: {e}")))?;
        Ok(Self { client })
    }

    /// Creates a pool from a [`DatabaseConfig`] and checks out one connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created or connected.
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, MigrateError> {
        if config.dialect != Dialect::Postgres {
            return Err(MigrateError::ConfigurationError(format!(
                "PostgresBackend cannot serve a {:?} configuration",
                config.dialect
            )));
        }

        let mut pg_config = deadpool_postgres::Config::new();
        pg_config.dbname = Some(config.name.clone());
        pg_config.host = config.host.clone();
        pg_config.port = config.port;
        pg_config.user = config.user.clone();
        pg_config.password = config.password.clone();

        let pool = pg_config
            .create_pool(
                Some(deadpool_postgres::Runtime::Tokio1),
                tokio_postgres::NoTls,
            )
            .map_err(|e| MigrateError::OperationalError(format!("Failed to create pool: {e}")))?;

        Self::from_pool(&pool).await
    }

    /// Converts `Value` types to `tokio-postgres` parameters.
    fn value_to_sql_params(
        params: &[Value],
    ) -> Vec<Box<dyn tokio_postgres::types::ToSql + Sync + Send>> {
        params
            .iter()
            .map(|v| -> Box<dyn tokio_postgres::types::ToSql + Sync + Send> {
                match v {
                    Value::Null => Box::new(Option::<String>::None),
                    Value::Bool(b) => Box::new(*b),
                    Value::Int(i) => Box::new(*i),
                    Value::Float(f) => Box::new(*f),
                    Value::String(s) => Box::new(s.clone()),
                    Value::DateTimeTz(dt) => Box::new(*dt),
                }
            })
            .collect()
    }

    /// Converts a `tokio_postgres::Row` to our generic `Row`.
    fn convert_row(pg_row: &tokio_postgres::Row) -> Row {
        use tokio_postgres::types::Type;

        let columns: Vec<String> = pg_row
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let values: Vec<Value> = pg_row
            .columns()
            .iter()
            .enumerate()
            .map(|(i, col)| match *col.type_() {
                Type::BOOL => pg_row
                    .try_get::<_, Option<bool>>(i)
                    .ok()
                    .flatten()
                    .map_or(Value::Null, Value::Bool),
                Type::INT2 => pg_row
                    .try_get::<_, Option<i16>>(i)
                    .ok()
                    .flatten()
                    .map_or(Value::Null, |v| Value::Int(i64::from(v))),
                Type::INT4 => pg_row
                    .try_get::<_, Option<i32>>(i)
                    .ok()
                    .flatten()
                    .map_or(Value::Null, |v| Value::Int(i64::from(v))),
                Type::INT8 => pg_row
                    .try_get::<_, Option<i64>>(i)
                    .ok()
                    .flatten()
                    .map_or(Value::Null, Value::Int),
                Type::FLOAT8 => pg_row
                    .try_get::<_, Option<f64>>(i)
                    .ok()
                    .flatten()
                    .map_or(Value::Null, Value::Float),
                Type::TIMESTAMPTZ => pg_row
                    .try_get::<_, Option<chrono::DateTime<chrono::Utc>>>(i)
                    .ok()
                    .flatten()
                    .map_or(Value::Null, Value::DateTimeTz),
                // Fall back to string representation for text and unknown types
                _ => pg_row
                    .try_get::<_, Option<String>>(i)
                    .ok()
                    .flatten()
                    .map_or(Value::Null, Value::String),
            })
            .collect();

        Row::new(columns, values)
    }
}

#[async_trait::async_trait]
impl Executor for PostgresBackend {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, MigrateError> {
        let sql_params = Self::value_to_sql_params(params);
        let param_refs: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = sql_params
            .iter()
            .map(|p| p.as_ref() as &(dyn tokio_postgres::types::ToSql + Sync))
            .collect();

        self.client
            .execute(sql, &param_refs)
            .await
            .map_err(|e| MigrateError::DatabaseError(format!("{e}")))
    }

    async fn execute_batch(&self, sql: &str) -> Result<(), MigrateError> {
        self.client
            .batch_execute(sql)
            .await
            .map_err(|e| MigrateError::DatabaseError(format!("{e}")))
    }

    async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Row, MigrateError> {
        let sql_params = Self::value_to_sql_params(params);
        let param_refs: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = sql_params
            .iter()
            .map(|p| p.as_ref() as &(dyn tokio_postgres::types::ToSql + Sync))
            .collect();

        let rows = self
            .client
            .query(sql, &param_refs)
            .await
            .map_err(|e| MigrateError::DatabaseError(format!("{e}")))?;

        match rows.as_slice() {
            [] => Err(MigrateError::DoesNotExist("No rows returned".to_string())),
            [row] => Ok(Self::convert_row(row)),
            _ => Err(MigrateError::MultipleObjectsReturned(format!(
                "Expected 1 row, got {}",
                rows.len()
            ))),
        }
    }
}

#[async_trait::async_trait]
impl DatabaseBackend for PostgresBackend {
    fn vendor(&self) -> &str {
        "postgresql"
    }

    async fn begin_transaction(&self) -> Result<(), MigrateError> {
        self.execute_batch("BEGIN").await
    }

    async fn commit(&self) -> Result<(), MigrateError> {
        self.execute_batch("COMMIT").await
    }

    async fn rollback(&self) -> Result<(), MigrateError> {
        self.execute_batch("ROLLBACK").await
    }
}
