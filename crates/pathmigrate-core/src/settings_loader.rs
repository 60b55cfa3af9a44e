//! Settings loading from configuration files.
//!
//! ## Loading Order
//!
//! 1. Start with default settings.
//! 2. Load from a TOML file (overriding defaults).
//! 3. Apply environment variable overrides (highest priority).
//!
//! ## Environment Variable Mapping
//!
//! | Env Var | Setting |
//! |---|---|
//! | `PATHMIGRATE_MIGRATION_DIR` | `migrations_dir` |
//! | `PATHMIGRATE_MIGRATION_TABLE` | `migration_table` |
//! | `PATHMIGRATE_SCHEMA` | `schema` |
//! | `PATHMIGRATE_LOG_LEVEL` | `log_level` |
//!
//! ## Examples
//!
//! ```rust,no_run
//! use pathmigrate_core::settings_loader;
//!
//! let settings = settings_loader::from_toml_file_with_env("config/migrate.toml").unwrap();
//! ```

use std::path::Path;

use crate::error::MigrateError;
use crate::settings::Settings;

/// Environment variable supplying the migration directory.
pub const ENV_MIGRATION_DIR: &str = "PATHMIGRATE_MIGRATION_DIR";
/// Environment variable supplying the version table name.
pub const ENV_MIGRATION_TABLE: &str = "PATHMIGRATE_MIGRATION_TABLE";
/// Environment variable supplying the schema.
pub const ENV_SCHEMA: &str = "PATHMIGRATE_SCHEMA";
/// Environment variable supplying the log level.
pub const ENV_LOG_LEVEL: &str = "PATHMIGRATE_LOG_LEVEL";

/// Loads settings from a TOML string.
///
/// Fields not present in the TOML keep their default values.
///
/// # Errors
///
/// Returns an error if the TOML is malformed or cannot be deserialized.
pub fn from_toml_str(toml_str: &str) -> Result<Settings, MigrateError> {
    // Merge through serde_json so nested tables keep defaults for missing keys.
    let toml_value: toml::Value = toml::from_str(toml_str)
        .map_err(|e| MigrateError::ConfigurationError(format!("Failed to parse TOML: {e}")))?;

    let json_value = toml_to_json(toml_value);
    let default_json = serde_json::to_value(Settings::default()).map_err(|e| {
        MigrateError::ConfigurationError(format!("Failed to serialize default settings: {e}"))
    })?;

    let merged = merge_json(default_json, json_value);
    serde_json::from_value(merged).map_err(|e| {
        MigrateError::ConfigurationError(format!("Failed to deserialize settings from TOML: {e}"))
    })
}

/// Loads settings from a TOML file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Settings, MigrateError> {
    let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
        MigrateError::ConfigurationError(format!(
            "Failed to read TOML file '{}': {e}",
            path.as_ref().display()
        ))
    })?;
    from_toml_str(&content)
}

/// Loads settings from a TOML file and then applies environment variable overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be read or the TOML is malformed.
pub fn from_toml_file_with_env(path: impl AsRef<Path>) -> Result<Settings, MigrateError> {
    let mut settings = from_toml_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Applies environment variable overrides to a settings struct.
///
/// Empty variables are ignored so an exported-but-blank variable never wipes
/// a value coming from the file.
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Some(val) = non_empty_env(ENV_MIGRATION_DIR) {
        settings.migrations_dir = val;
    }

    if let Some(val) = non_empty_env(ENV_MIGRATION_TABLE) {
        settings.migration_table = val;
    }

    if let Some(val) = non_empty_env(ENV_SCHEMA) {
        settings.schema = val;
    }

    if let Some(val) = non_empty_env(ENV_LOG_LEVEL) {
        settings.log_level = val;
    }
}

/// Reads an environment variable, treating blank values as unset.
pub fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================
// Helpers
// ============================================================

fn toml_to_json(value: toml::Value) -> serde_json::Value {
    match value {
        toml::Value::String(s) => serde_json::Value::String(s),
        toml::Value::Integer(i) => serde_json::json!(i),
        toml::Value::Float(f) => serde_json::json!(f),
        toml::Value::Boolean(b) => serde_json::Value::Bool(b),
        toml::Value::Datetime(dt) => serde_json::Value::String(dt.to_string()),
        toml::Value::Array(arr) => {
            serde_json::Value::Array(arr.into_iter().map(toml_to_json).collect())
        }
        toml::Value::Table(table) => {
            let map: serde_json::Map<String, serde_json::Value> = table
                .into_iter()
                .map(|(k, v)| (k, toml_to_json(v)))
                .collect();
            serde_json::Value::Object(map)
        }
    }
}

/// Deep-merges two JSON values. The `override_val` takes precedence.
fn merge_json(base: serde_json::Value, override_val: serde_json::Value) -> serde_json::Value {
    match (base, override_val) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, override_v) in override_map {
                let merged = if let Some(base_v) = base_map.remove(&key) {
                    merge_json(base_v, override_v)
                } else {
                    override_v
                };
                base_map.insert(key, merged);
            }
            serde_json::Value::Object(base_map)
        }
        (_, override_val) => override_val,
    }
}
