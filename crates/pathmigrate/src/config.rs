//! Runtime configuration of the migration engine.
//!
//! [`Config`] carries everything in [`Settings`] plus the pieces that cannot
//! be serialized: an optional migration tree, the three hooks, and the file
//! skip predicate.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use pathmigrate_core::settings::{
    DEFAULT_FILE_SUFFIX, DEFAULT_MIGRATIONS_DIR, DEFAULT_MIGRATION_TABLE,
};
use pathmigrate_core::settings_loader::{non_empty_env, ENV_MIGRATION_DIR, ENV_MIGRATION_TABLE};
use pathmigrate_core::{Expansion, Settings};
use regex::Regex;

use crate::result::MigrateResult;
use crate::source::{FileSource, SourceEntry};
use crate::version::{parse_version, NO_VERSION};

/// Called with `(path, current_version)` before the first file of a path runs.
pub type BeforeHook = Arc<dyn Fn(&str, i64) + Send + Sync>;

/// Called with `(file_path, new_version)` after each applied file.
pub type AfterEachHook = Arc<dyn Fn(&str, i64) + Send + Sync>;

/// Called with the whole result after a committed run.
pub type AfterAllHook = Arc<dyn Fn(&MigrateResult) + Send + Sync>;

/// Decides whether a listed entry is skipped, given the path's last version.
pub type FileSkipper = Arc<dyn Fn(&SourceEntry, i64) -> bool + Send + Sync>;

static IDENTIFIER_FILTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9_]").expect("valid regex"));

/// Returns the standard skip predicate for files ending in `suffix`.
///
/// An entry is skipped when it is a directory, lacks the suffix, carries no
/// valid version, or is not newer than the last applied version.
pub fn default_file_skipper(suffix: &str) -> FileSkipper {
    let suffix = suffix.to_string();
    Arc::new(move |entry: &SourceEntry, last_version: i64| {
        if entry.is_dir || !entry.name.ends_with(&suffix) {
            return true;
        }
        let version = parse_version(&entry.name);
        version == NO_VERSION || version <= last_version
    })
}

/// Strips everything but ASCII letters, digits, and `_`.
pub fn sanitize_identifier(value: &str) -> String {
    IDENTIFIER_FILTER.replace_all(value.trim(), "").into_owned()
}

/// Engine configuration.
///
/// # Examples
///
/// ```
/// use pathmigrate::Config;
///
/// let config = Config::new()
///     .with_migrations_dir("db/migrations")
///     .with_table("schema_versions;--")
///     .sanitized();
/// assert_eq!(config.migration_table, "schema_versions");
/// ```
#[derive(Clone)]
pub struct Config {
    /// Root directory of the migration tree on disk.
    pub migrations_dir: String,
    /// Paths processed before all others, in this order.
    pub pre_folders: Vec<String>,
    /// Schema for `search_path` and table qualification.
    pub schema: String,
    /// Name of the version table.
    pub migration_table: String,
    /// Placeholder values.
    pub values: HashMap<String, String>,
    /// Directory names excluded from discovery.
    pub skip_dirs: Vec<String>,
    /// Suffix of migration files.
    pub file_suffix: String,
    /// Placeholder expansion mode.
    pub expansion: Expansion,
    /// Deadline for a whole run.
    pub timeout: Option<Duration>,
    /// Tree used instead of `migrations_dir`.
    pub migrations: Option<Arc<dyn FileSource>>,
    pub before_all: Option<BeforeHook>,
    pub after_each: Option<AfterEachHook>,
    pub after_all: Option<AfterAllHook>,
    /// Replaces [`default_file_skipper`] when set.
    pub file_skipper: Option<FileSkipper>,
}

impl Config {
    /// Creates a configuration from default [`Settings`].
    pub fn new() -> Self {
        Self::from_settings(Settings::default())
    }

    /// Creates a configuration from loaded [`Settings`].
    pub fn from_settings(settings: Settings) -> Self {
        Self {
            migrations_dir: settings.migrations_dir,
            pre_folders: settings.pre_folders,
            schema: settings.schema,
            migration_table: settings.migration_table,
            values: settings.values,
            skip_dirs: settings.skip_dirs,
            file_suffix: settings.file_suffix,
            expansion: settings.expansion,
            timeout: settings.timeout_secs.map(Duration::from_secs),
            migrations: None,
            before_all: None,
            after_each: None,
            after_all: None,
            file_skipper: None,
        }
    }

    #[must_use]
    pub fn with_migrations_dir(mut self, dir: impl Into<String>) -> Self {
        self.migrations_dir = dir.into();
        self
    }

    /// Uses `source` as the migration tree instead of a directory on disk.
    #[must_use]
    pub fn with_source(mut self, source: impl FileSource + 'static) -> Self {
        self.migrations = Some(Arc::new(source));
        self
    }

    #[must_use]
    pub fn with_pre_folders<I, S>(mut self, pre_folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pre_folders = pre_folders.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.migration_table = table.into();
        self
    }

    /// Adds one placeholder value.
    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_expansion(mut self, expansion: Expansion) -> Self {
        self.expansion = expansion;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_before_all(mut self, hook: impl Fn(&str, i64) + Send + Sync + 'static) -> Self {
        self.before_all = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_after_each(mut self, hook: impl Fn(&str, i64) + Send + Sync + 'static) -> Self {
        self.after_each = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_after_all(mut self, hook: impl Fn(&MigrateResult) + Send + Sync + 'static) -> Self {
        self.after_all = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn with_file_skipper(
        mut self,
        skipper: impl Fn(&SourceEntry, i64) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.file_skipper = Some(Arc::new(skipper));
        self
    }

    /// Returns the configured skip predicate or the default one.
    pub fn skipper(&self) -> FileSkipper {
        self.file_skipper
            .clone()
            .unwrap_or_else(|| default_file_skipper(&self.file_suffix))
    }

    /// Trims, defaults, and filters the configuration in place.
    ///
    /// - An empty `migrations_dir` falls back to `PATHMIGRATE_MIGRATION_DIR`,
    ///   then to `migrations`. With a tree source it is always `.`.
    /// - An empty `migration_table` falls back to
    ///   `PATHMIGRATE_MIGRATION_TABLE`, then to `migration`.
    /// - `schema` and `migration_table` keep only `[A-Za-z0-9_]`.
    pub fn sanitize(&mut self) {
        self.migrations_dir = self.migrations_dir.trim().to_string();
        if self.migrations.is_some() {
            self.migrations_dir = ".".to_string();
        } else if self.migrations_dir.is_empty() {
            self.migrations_dir =
                non_empty_env(ENV_MIGRATION_DIR).unwrap_or_else(|| DEFAULT_MIGRATIONS_DIR.to_string());
        }

        let mut table = self.migration_table.trim().to_string();
        if table.is_empty() {
            table = non_empty_env(ENV_MIGRATION_TABLE)
                .unwrap_or_else(|| DEFAULT_MIGRATION_TABLE.to_string());
        }
        self.migration_table = sanitize_identifier(&table);
        // A table name made only of filtered characters would produce broken SQL.
        if self.migration_table.is_empty() {
            self.migration_table = DEFAULT_MIGRATION_TABLE.to_string();
        }
        self.schema = sanitize_identifier(&self.schema);

        self.pre_folders = self
            .pre_folders
            .iter()
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .collect();
        self.skip_dirs = self
            .skip_dirs
            .iter()
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .collect();

        self.file_suffix = self.file_suffix.trim().to_string();
        if self.file_suffix.is_empty() {
            self.file_suffix = DEFAULT_FILE_SUFFIX.to_string();
        }
    }

    /// Consuming form of [`Config::sanitize`].
    #[must_use]
    pub fn sanitized(mut self) -> Self {
        self.sanitize();
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("migrations_dir", &self.migrations_dir)
            .field("pre_folders", &self.pre_folders)
            .field("schema", &self.schema)
            .field("migration_table", &self.migration_table)
            .field("values", &self.values.keys().collect::<Vec<_>>())
            .field("skip_dirs", &self.skip_dirs)
            .field("file_suffix", &self.file_suffix)
            .field("expansion", &self.expansion)
            .field("timeout", &self.timeout)
            .field("migrations", &self.migrations.is_some())
            .field("before_all", &self.before_all.is_some())
            .field("after_each", &self.after_each.is_some())
            .field("after_all", &self.after_all.is_some())
            .field("file_skipper", &self.file_skipper.is_some())
            .finish()
    }
}
