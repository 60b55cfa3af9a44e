//! Settings for the pathmigrate engine.
//!
//! [`Settings`] holds every serializable knob the migrator understands. Runtime
//! pieces that cannot be serialized (hooks, a custom file source, the file
//! skip predicate) live on the engine's `Config`, which is built from these
//! settings.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Default directory holding migration files.
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// Default name of the version table.
pub const DEFAULT_MIGRATION_TABLE: &str = "migration";

/// Default suffix a file must carry to be considered a migration.
pub const DEFAULT_FILE_SUFFIX: &str = ".sql";

/// Controls how `$`-placeholders inside migration scripts are expanded.
///
/// SQL routinely contains literal `$` characters (dollar quoting, positional
/// parameters, currency values), so the mode is explicit instead of being
/// inferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Expansion {
    /// `Full` when template values are configured, otherwise verbatim.
    #[default]
    Auto,
    /// Expand both `${KEY}` and `$KEY`.
    Full,
    /// Expand only `${KEY}`.
    Braced,
    /// Never expand; scripts run verbatim.
    Disabled,
}

/// Serializable migrator settings.
///
/// # Examples
///
/// ```
/// use pathmigrate_core::Settings;
///
/// let settings = Settings::default();
/// assert_eq!(settings.migration_table, "migration");
/// assert_eq!(settings.skip_dirs, vec!["archive".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Root directory of the migration tree.
    pub migrations_dir: String,
    /// Paths processed before every other discovered path, in this order.
    pub pre_folders: Vec<String>,
    /// Schema used for `search_path` and to qualify the version table.
    pub schema: String,
    /// Name of the version table.
    pub migration_table: String,
    /// Values substituted into `$KEY` / `${KEY}` placeholders.
    pub values: HashMap<String, String>,
    /// Directory base names excluded from discovery together with their subtree.
    pub skip_dirs: Vec<String>,
    /// Suffix a migration file must carry.
    pub file_suffix: String,
    /// Placeholder expansion mode.
    pub expansion: Expansion,
    /// Optional deadline for a whole run, in seconds.
    pub timeout_secs: Option<u64>,
    /// The log level (e.g. "info", "debug", "warn").
    pub log_level: String,
    /// Whether human-readable (rather than JSON) log output is used.
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            migrations_dir: String::new(),
            pre_folders: Vec::new(),
            schema: String::new(),
            migration_table: String::new(),
            values: HashMap::new(),
            skip_dirs: vec!["archive".to_string()],
            file_suffix: DEFAULT_FILE_SUFFIX.to_string(),
            expansion: Expansion::Auto,
            timeout_secs: None,
            log_level: "info".to_string(),
            debug: false,
        }
    }
}
