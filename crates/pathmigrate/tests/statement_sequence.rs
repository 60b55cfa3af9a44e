//! Statement-level tests against a recording executor speaking the
//! PostgreSQL dialect.
//!
//! The recorder keeps the version table in memory, so these tests can check
//! exactly which statements a run issues: the lock, `search_path`, inserts,
//! and the transaction boundaries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use pathmigrate::{migrate, migrate_in_tx, Config, MemorySource, Migrator, RunContext};
use pathmigrate_backends::{DatabaseBackend, Dialect, Executor, Row, Value};
use pathmigrate_core::MigrateError;
use tokio_util::sync::CancellationToken;

// ── Recording executor ────────────────────────────────────────────────

#[derive(Default)]
struct State {
    statements: Vec<String>,
    versions: HashMap<String, i64>,
    /// Versions committed by a "concurrent" run, revealed once the lock is taken.
    on_lock: Vec<(String, i64)>,
    fail_rollback: bool,
}

#[derive(Default, Clone)]
struct Recorder {
    state: Arc<Mutex<State>>,
}

impl Recorder {
    fn with_version(self, path: &str, version: i64) -> Self {
        self.state
            .lock()
            .unwrap()
            .versions
            .insert(path.to_string(), version);
        self
    }

    fn committed_on_lock(self, path: &str, version: i64) -> Self {
        self.state
            .lock()
            .unwrap()
            .on_lock
            .push((path.to_string(), version));
        self
    }

    fn failing_rollback(self) -> Self {
        self.state.lock().unwrap().fail_rollback = true;
        self
    }

    fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.statements()
            .iter()
            .filter(|s| s.starts_with(prefix))
            .count()
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => panic!("expected a string parameter, got {other:?}"),
    }
}

#[async_trait::async_trait]
impl Executor for Recorder {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64, MigrateError> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(sql.to_string());
        if sql.starts_with("INSERT INTO") {
            let Value::Int(version) = &params[1] else {
                panic!("expected an integer version");
            };
            state.versions.insert(text(&params[0]), *version);
        }
        Ok(1)
    }

    async fn execute_batch(&self, sql: &str) -> Result<(), MigrateError> {
        {
            let mut state = self.state.lock().unwrap();
            state.statements.push(sql.to_string());
            if sql.starts_with("LOCK TABLE") {
                let committed = std::mem::take(&mut state.on_lock);
                state.versions.extend(committed);
            }
            if sql.contains("FAIL") {
                return Err(MigrateError::DatabaseError("syntax error at or near \"FAIL\"".into()));
            }
        }
        if sql.contains("SLEEP") {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Row, MigrateError> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(sql.to_string());
        let version = state
            .versions
            .get(&text(&params[0]))
            .map_or(Value::Null, |v| Value::Int(*v));
        Ok(Row::new(vec!["version".to_string()], vec![version]))
    }
}

#[async_trait::async_trait]
impl DatabaseBackend for Recorder {
    fn vendor(&self) -> &str {
        "recorder"
    }

    async fn begin_transaction(&self) -> Result<(), MigrateError> {
        self.execute_batch("BEGIN").await
    }

    async fn commit(&self) -> Result<(), MigrateError> {
        self.execute_batch("COMMIT").await
    }

    async fn rollback(&self) -> Result<(), MigrateError> {
        self.execute_batch("ROLLBACK").await?;
        if self.state.lock().unwrap().fail_rollback {
            return Err(MigrateError::OperationalError("connection closed".into()));
        }
        Ok(())
    }
}

fn tree() -> MemorySource {
    MemorySource::new()
        .with_file("/1_a.sql", "CREATE TABLE a (id INT);")
        .with_file("/2_b.sql", "CREATE TABLE b (id INT);")
        .with_file("/test/1_c.sql", "CREATE TABLE c (id INT);")
}

// ── Locking ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_up_to_date_run_never_locks() {
    let recorder = Recorder::default()
        .with_version("/", 2)
        .with_version("/test", 1);

    let result = migrate_in_tx(&recorder, Config::new().with_source(tree()))
        .await
        .unwrap();

    assert!(!result.any_changed());
    let statements = recorder.statements();
    assert_eq!(statements.len(), 3);
    assert!(statements[0].starts_with("CREATE TABLE IF NOT EXISTS migration"));
    assert_eq!(
        statements[1],
        "SELECT MAX(version) AS version FROM migration WHERE path = $1"
    );
    assert_eq!(statements[1], statements[2]);
    assert_eq!(recorder.count("LOCK"), 0);
    assert_eq!(recorder.count("INSERT"), 0);
}

#[tokio::test]
async fn test_lock_taken_once_before_first_script() {
    let recorder = Recorder::default();

    migrate_in_tx(&recorder, Config::new().with_source(tree()))
        .await
        .unwrap();

    let statements = recorder.statements();
    let select = "SELECT MAX(version) AS version FROM migration WHERE path = $1";
    let insert = "INSERT INTO migration (path, version) VALUES ($1, $2)";
    assert_eq!(
        statements[1..],
        [
            select,
            "LOCK TABLE migration IN ACCESS EXCLUSIVE MODE",
            select,
            "CREATE TABLE a (id INT);",
            insert,
            "CREATE TABLE b (id INT);",
            insert,
            select,
            "CREATE TABLE c (id INT);",
            insert,
        ]
    );
}

#[tokio::test]
async fn test_lock_only_when_some_path_has_work() {
    let recorder = Recorder::default().with_version("/", 2);

    let result = migrate_in_tx(&recorder, Config::new().with_source(tree()))
        .await
        .unwrap();

    assert!(!result.get("/").unwrap().changed());
    assert!(result.get("/test").unwrap().changed());
    let statements = recorder.statements();
    let lock_at = statements
        .iter()
        .position(|s| s.starts_with("LOCK TABLE"))
        .unwrap();
    // Lookup of "/" and of "/test" precede the lock.
    assert_eq!(lock_at, 3);
}

#[tokio::test]
async fn test_versions_rechecked_after_lock() {
    let recorder = Recorder::default()
        .with_version("/test", 1)
        .committed_on_lock("/", 2);

    let result = migrate_in_tx(&recorder, Config::new().with_source(tree()))
        .await
        .unwrap();

    let root = result.get("/").unwrap();
    assert_eq!((root.previous_version, root.new_version), (2, 2));
    assert_eq!(recorder.count("CREATE TABLE a"), 0);
    assert_eq!(recorder.count("INSERT"), 0);
    assert_eq!(recorder.count("LOCK"), 1);
}

#[tokio::test]
async fn test_schema_sets_search_path_first() {
    let recorder = Recorder::default();

    migrate_in_tx(&recorder, Config::new().with_source(tree()).with_schema("tenant_a"))
        .await
        .unwrap();

    let statements = recorder.statements();
    assert_eq!(statements[0], "SET LOCAL search_path = tenant_a");
    assert!(statements[1].starts_with("CREATE TABLE IF NOT EXISTS tenant_a.migration ("));
    assert!(statements.contains(&"LOCK TABLE tenant_a.migration IN ACCESS EXCLUSIVE MODE".to_string()));
}

// ── Transaction boundaries ────────────────────────────────────────────

#[tokio::test]
async fn test_migrate_commits_on_success() {
    let recorder = Recorder::default();

    migrate(&recorder, Config::new().with_source(tree())).await.unwrap();

    let statements = recorder.statements();
    assert_eq!(statements.first().map(String::as_str), Some("BEGIN"));
    assert_eq!(statements.last().map(String::as_str), Some("COMMIT"));
    assert_eq!(recorder.count("ROLLBACK"), 0);
}

#[tokio::test]
async fn test_execution_error_rolls_back() {
    let recorder = Recorder::default();
    let source = tree().with_file("/3_broken.sql", "FAIL;");

    let err = migrate(&recorder, Config::new().with_source(source))
        .await
        .unwrap_err();

    match err {
        MigrateError::Execution { path, version, source } => {
            assert_eq!(path, "/3_broken.sql");
            assert_eq!(version, 3);
            assert!(source.to_string().contains("FAIL"));
        }
        other => panic!("expected an execution error, got {other:?}"),
    }
    assert_eq!(recorder.statements().last().map(String::as_str), Some("ROLLBACK"));
    assert_eq!(recorder.count("COMMIT"), 0);
    assert_eq!(recorder.count("CREATE TABLE c"), 0);
}

#[tokio::test]
async fn test_rollback_failure_is_reported_with_cause() {
    let recorder = Recorder::default().failing_rollback();
    let source = MemorySource::new().with_file("/1_broken.sql", "FAIL;");

    let err = migrate(&recorder, Config::new().with_source(source))
        .await
        .unwrap_err();

    assert!(matches!(err, MigrateError::RollbackFailed { .. }));
    let message = err.to_string();
    assert!(message.contains("/1_broken.sql"));
    assert!(message.contains("also rollback error"));
}

// ── Cancellation ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_cancellation_unblocks_running_script() {
    let recorder = Recorder::default();
    let source = MemorySource::new().with_file("/1_slow.sql", "SELECT SLEEP;");
    let token = CancellationToken::new();
    let migrator = Migrator::new(Config::new().with_source(source))
        .with_context(RunContext::new().with_token(token.clone()));

    let canceller = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
    });

    let err = migrator.migrate(&recorder).await.unwrap_err();
    canceller.await.unwrap();

    assert!(matches!(err, MigrateError::Cancelled), "{err:?}");
    assert_eq!(recorder.statements().last().map(String::as_str), Some("ROLLBACK"));
    assert_eq!(recorder.count("INSERT"), 0);
}

#[tokio::test]
async fn test_cancelled_before_start_issues_nothing() {
    let recorder = Recorder::default();
    let token = CancellationToken::new();
    token.cancel();
    let migrator = Migrator::new(Config::new().with_source(tree()))
        .with_context(RunContext::new().with_token(token));

    let err = migrator.migrate(&recorder).await.unwrap_err();

    assert!(err.is_cancellation());
    assert!(recorder.statements().is_empty());
}

#[tokio::test]
async fn test_timeout_rolls_back() {
    let recorder = Recorder::default();
    let source = MemorySource::new().with_file("/1_slow.sql", "SELECT SLEEP;");
    let config = Config::new()
        .with_source(source)
        .with_timeout(Duration::from_millis(20));

    let err = migrate(&recorder, config).await.unwrap_err();

    assert!(matches!(err, MigrateError::Timeout(_)), "{err:?}");
    assert_eq!(recorder.statements().last().map(String::as_str), Some("ROLLBACK"));
}
