//! # pathmigrate-core
//!
//! Core types, settings, and error types shared by the pathmigrate crates.
//! This crate has no database dependencies and provides the foundation the
//! backends and the migration engine build on.
//!
//! ## Modules
//!
//! - [`error`] - Error taxonomy and result alias
//! - [`settings`] - Serializable migrator settings with defaults
//! - [`settings_loader`] - TOML loading and environment variable overrides
//! - [`logging`] - Tracing-based logging integration

pub mod error;
pub mod logging;
pub mod settings;
pub mod settings_loader;

// Re-export the most commonly used types at the crate root.
pub use error::{MigrateError, PathMigrateResult};
pub use settings::{Expansion, Settings};
