//! The migration engine.
//!
//! A run walks the planned paths in order. For each path it reads the last
//! applied version, lists the pending files, and applies them one by one,
//! recording each version in the same transaction as its script.
//!
//! The version table is locked only once some path has work to do. Right
//! after taking the lock the path is re-read, so a process that waited
//! behind a concurrent run sees that run's versions and finds nothing left.
//!
//! Every database round trip and every source read is raced against the
//! run's [`CancellationToken`]; an optional deadline bounds the whole run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pathmigrate_backends::{DatabaseBackend, Executor};
use pathmigrate_core::logging::run_span;
use pathmigrate_core::{MigrateError, PathMigrateResult};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::config::{Config, FileSkipper};
use crate::expand::expand;
use crate::planner::PathPlanner;
use crate::result::{MigrateResult, PendingFile};
use crate::source::{join, DirSource, FileSource};
use crate::store::VersionStore;
use crate::version::parse_version;

/// Cancellation and deadline shared by every suspension point of a run.
#[derive(Debug, Clone, Default)]
pub struct RunContext {
    token: CancellationToken,
    timeout: Option<Duration>,
}

impl RunContext {
    /// A context that is never cancelled and has no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `token` to cancel the run from outside.
    #[must_use]
    pub fn with_token(mut self, token: CancellationToken) -> Self {
        self.token = token;
        self
    }

    /// Bounds the whole run by `timeout`.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the cancellation token.
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the deadline of a whole run, if any.
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Awaits `fut` unless the token fires first.
    pub async fn guard<T, F>(&self, fut: F) -> PathMigrateResult<T>
    where
        F: Future<Output = PathMigrateResult<T>>,
    {
        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(MigrateError::Cancelled),
            result = fut => result,
        }
    }

    async fn bounded<T, F>(&self, fut: F) -> PathMigrateResult<T>
    where
        F: Future<Output = PathMigrateResult<T>>,
    {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| MigrateError::Timeout(limit))?,
            None => fut.await,
        }
    }
}

/// Applies the migrations of one configuration.
///
/// # Examples
///
/// ```no_run
/// use pathmigrate::{Config, Migrator};
/// use pathmigrate_backends::SqliteBackend;
///
/// # async fn run() -> pathmigrate_core::PathMigrateResult<()> {
/// let backend = SqliteBackend::open("app.db")?;
/// let migrator = Migrator::new(Config::new().with_migrations_dir("migrations"));
/// let result = migrator.migrate(&backend).await?;
/// for path in &result {
///     println!("{}: {} -> {}", path.path, path.previous_version, path.new_version);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Migrator {
    config: Config,
    source: Arc<dyn FileSource>,
    store: VersionStore,
    planner: PathPlanner,
    skipper: FileSkipper,
    ctx: RunContext,
}

impl Migrator {
    /// Sanitizes `config` and resolves its migration source.
    pub fn new(config: Config) -> Self {
        let config = config.sanitized();
        let source: Arc<dyn FileSource> = match &config.migrations {
            Some(tree) => Arc::clone(tree),
            None => Arc::new(DirSource::new(&config.migrations_dir)),
        };
        let store = VersionStore::new(config.schema.clone(), config.migration_table.clone());
        let planner =
            PathPlanner::new(config.skip_dirs.iter().cloned()).with_pre_folders(&config.pre_folders);
        let skipper = config.skipper();
        let ctx = match config.timeout {
            Some(timeout) => RunContext::new().with_timeout(timeout),
            None => RunContext::new(),
        };

        Self {
            config,
            source,
            store,
            planner,
            skipper,
            ctx,
        }
    }

    /// Replaces the run context. A deadline already set from the
    /// configuration is kept when `ctx` has none.
    #[must_use]
    pub fn with_context(mut self, ctx: RunContext) -> Self {
        let timeout = ctx.timeout.or(self.ctx.timeout);
        self.ctx = RunContext {
            token: ctx.token,
            timeout,
        };
        self
    }

    /// Returns the sanitized configuration.
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the version store of this migrator.
    pub const fn store(&self) -> &VersionStore {
        &self.store
    }

    /// Runs in a transaction of its own: begins, migrates, then commits, or
    /// rolls back on any failure. The after-all hook fires after the commit.
    ///
    /// # Errors
    ///
    /// Returns the failure of the run, or [`MigrateError::RollbackFailed`]
    /// when the rollback failed as well. No partial result is returned.
    pub async fn migrate<B>(&self, backend: &B) -> PathMigrateResult<MigrateResult>
    where
        B: DatabaseBackend + ?Sized,
    {
        self.begin(backend).await?;

        let outcome = match self.migrate_in_tx(backend).await {
            Ok(result) => backend.commit().await.map(|()| result),
            Err(err) => Err(err),
        };

        match outcome {
            Ok(result) => {
                if let Some(hook) = &self.config.after_all {
                    hook(&result);
                }
                Ok(result)
            }
            Err(err) => {
                tracing::warn!(error = %err, "migration failed, rolling back");
                match backend.rollback().await {
                    Ok(()) => Err(err),
                    Err(rollback) => Err(MigrateError::RollbackFailed {
                        error: Box::new(err),
                        rollback: Box::new(rollback),
                    }),
                }
            }
        }
    }

    /// Begins the run's transaction.
    ///
    /// A begin that is already waiting for the database lock is never
    /// dropped: on cancellation it is driven to completion and the
    /// transaction it opened is rolled back, so no lock outlives the run.
    async fn begin<B>(&self, backend: &B) -> PathMigrateResult<()>
    where
        B: DatabaseBackend + ?Sized,
    {
        if self.ctx.token.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }

        let begin = backend.begin_transaction();
        tokio::pin!(begin);

        tokio::select! {
            biased;
            result = &mut begin => result,
            () = self.ctx.token.cancelled() => {
                if begin.await.is_err() {
                    return Err(MigrateError::Cancelled);
                }
                tracing::debug!("run cancelled while beginning, rolling back");
                match backend.rollback().await {
                    Ok(()) => Err(MigrateError::Cancelled),
                    Err(rollback) => Err(MigrateError::RollbackFailed {
                        error: Box::new(MigrateError::Cancelled),
                        rollback: Box::new(rollback),
                    }),
                }
            }
        }
    }

    /// Runs inside the caller's transaction. Never commits and never fires
    /// the after-all hook.
    ///
    /// # Errors
    ///
    /// Fails on the first source, database, or execution error, and on
    /// cancellation or timeout. The caller is expected to roll back.
    pub async fn migrate_in_tx<E>(&self, executor: &E) -> PathMigrateResult<MigrateResult>
    where
        E: Executor + ?Sized,
    {
        let span = run_span(&self.store.table_name());
        self.ctx
            .bounded(self.run(executor))
            .instrument(span)
            .await
    }

    /// Lists the files the next run would apply, per path in processing
    /// order. Takes no lock and records nothing; the version table is
    /// created if missing.
    pub async fn pending<E>(&self, executor: &E) -> PathMigrateResult<Vec<PendingFile>>
    where
        E: Executor + ?Sized,
    {
        let work = async {
            self.ctx.guard(self.store.set_schema(executor)).await?;
            self.ctx.guard(self.store.ensure_table(executor)).await?;

            let mut pending = Vec::new();
            for path in self.discover().await? {
                let last = self.ctx.guard(self.store.last_version(executor, &path)).await?;
                pending.extend(self.pending_files(&path, last).await?);
            }
            Ok::<_, MigrateError>(pending)
        };
        self.ctx.bounded(work).await
    }

    async fn run<E>(&self, executor: &E) -> PathMigrateResult<MigrateResult>
    where
        E: Executor + ?Sized,
    {
        if self.ctx.guard(self.store.set_schema(executor)).await? {
            tracing::debug!(schema = %self.config.schema, "search_path set");
        }
        self.ctx.guard(self.store.ensure_table(executor)).await?;

        let paths = self.discover().await?;
        let mut result = MigrateResult::default();
        let mut locked = false;

        for path in &paths {
            let mut last = self.ctx.guard(self.store.last_version(executor, path)).await?;
            tracing::info!(path = %path, version = last, "current migration version");

            let mut files = self.pending_files(path, last).await?;

            if !files.is_empty() && !locked {
                if self.ctx.guard(self.store.lock(executor)).await? {
                    tracing::debug!(table = %self.store.table_name(), "version table locked");
                }
                locked = true;

                // Another run may have committed while we waited for the lock.
                last = self.ctx.guard(self.store.last_version(executor, path)).await?;
                files = self.pending_files(path, last).await?;
            }

            if files.is_empty() {
                tracing::debug!(path = %path, version = last, "nothing to migrate");
                result.push(path, last, last);
                continue;
            }

            if let Some(hook) = &self.config.before_all {
                hook(path, last);
            }

            let mut current = last;
            for file in files {
                self.apply(executor, &file).await?;
                current = file.version;
                if let Some(hook) = &self.config.after_each {
                    hook(&file.file_path, current);
                }
            }

            tracing::info!(path = %path, version = current, "migrated");
            result.push(path, last, current);
        }

        Ok(result)
    }

    async fn apply<E>(&self, executor: &E, file: &PendingFile) -> PathMigrateResult<()>
    where
        E: Executor + ?Sized,
    {
        let file_path = file.file_path.clone();
        let content = self
            .read_source(move |source| source.read_to_string(&file_path))
            .await?;
        let script = expand(&content, &self.config.values, self.config.expansion);

        tracing::trace!(file = %file.file_path, version = file.version, "applying migration");

        self.ctx
            .guard(executor.execute_batch(&script))
            .await
            .map_err(|source| {
                if source.is_cancellation() {
                    source
                } else {
                    MigrateError::Execution {
                        path: file.file_path.clone(),
                        version: file.version,
                        source: Box::new(source),
                    }
                }
            })?;

        self.ctx
            .guard(self.store.insert(executor, &file.path, file.version))
            .await
    }

    async fn discover(&self) -> PathMigrateResult<Vec<String>> {
        let planner = self.planner.clone();
        // Both a tree and a directory source are rooted at the migrations dir.
        self.read_source(move |source| planner.discover(source, "/"))
            .await
    }

    /// Lists the files at `path` newer than `last`, by ascending version.
    async fn pending_files(&self, path: &str, last: i64) -> PathMigrateResult<Vec<PendingFile>> {
        let dir = path.to_string();
        let entries = self.read_source(move |source| source.list(&dir)).await?;

        let mut files: Vec<PendingFile> = entries
            .into_iter()
            .filter(|entry| !entry.is_dir && !(self.skipper)(entry, last))
            .filter_map(|entry| {
                let version = parse_version(&entry.name);
                (version > last).then(|| PendingFile {
                    path: path.to_string(),
                    file_path: join(path, &entry.name),
                    name: entry.name,
                    version,
                })
            })
            .collect();

        files.sort_by_key(|f| f.version);
        Ok(files)
    }

    /// Runs a source call on the blocking pool, raced against the token.
    async fn read_source<T, F>(&self, f: F) -> PathMigrateResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn FileSource) -> PathMigrateResult<T> + Send + 'static,
    {
        let source = Arc::clone(&self.source);
        let task = tokio::task::spawn_blocking(move || f(source.as_ref()));
        self.ctx
            .guard(async move {
                match task.await {
                    Ok(result) => result,
                    Err(e) => Err(MigrateError::OperationalError(format!(
                        "Source task failed: {e}"
                    ))),
                }
            })
            .await
    }
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("planner", &self.planner)
            .field("ctx", &self.ctx)
            .finish_non_exhaustive()
    }
}

/// Applies `config` in a transaction of its own on `backend`.
///
/// See [`Migrator::migrate`].
pub async fn migrate<B>(backend: &B, config: Config) -> PathMigrateResult<MigrateResult>
where
    B: DatabaseBackend + ?Sized,
{
    Migrator::new(config).migrate(backend).await
}

/// Applies `config` inside the caller's transaction on `executor`.
///
/// See [`Migrator::migrate_in_tx`].
pub async fn migrate_in_tx<E>(executor: &E, config: Config) -> PathMigrateResult<MigrateResult>
where
    E: Executor + ?Sized,
{
    Migrator::new(config).migrate_in_tx(executor).await
}
