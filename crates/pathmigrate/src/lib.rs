//! # pathmigrate
//!
//! Embedded SQL migrations ordered by directory and version number.
//!
//! A migration tree is a directory (on disk or compiled into the binary)
//! whose every subdirectory is an independent *path* with its own version
//! sequence. Files named `<version>_<anything>.sql` are applied in ascending
//! numeric order, each recorded in a version table inside the same
//! transaction as its script, so a run either applies everything or nothing.
//!
//! ## Modules
//!
//! - [`version`] - Version numbers parsed from file names
//! - [`source`] - Filesystem and in-memory migration trees
//! - [`planner`] - Path discovery and priority ordering
//! - [`store`] - The version table
//! - [`expand`] - `$KEY` / `${KEY}` placeholder substitution
//! - [`config`] - Runtime configuration, hooks, and the file skip predicate
//! - [`engine`] - The [`Migrator`] and its entry points
//!
//! ## Quick start
//!
//! ```no_run
//! use pathmigrate::{migrate, Config};
//! use pathmigrate_backends::SqliteBackend;
//!
//! # async fn run() -> pathmigrate_core::PathMigrateResult<()> {
//! let backend = SqliteBackend::open("app.db")?;
//! let config = Config::new()
//!     .with_migrations_dir("migrations")
//!     .with_pre_folders(["/core"]);
//! let result = migrate(&backend, config).await?;
//! assert!(result.get("/core").is_some());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod expand;
pub mod planner;
pub mod result;
pub mod source;
pub mod store;
pub mod version;

pub use config::{default_file_skipper, Config, FileSkipper};
pub use engine::{migrate, migrate_in_tx, Migrator, RunContext};
pub use planner::PathPlanner;
pub use result::{MigrateResult, PathVersions, PendingFile};
pub use source::{DirSource, FileSource, MemorySource, SourceEntry};
pub use store::VersionStore;
pub use version::{parse_version, INITIAL_VERSION, NO_VERSION};

pub use pathmigrate_backends::{DatabaseBackend, Executor};
pub use pathmigrate_core::{Expansion, MigrateError, PathMigrateResult, Settings};
pub use tokio_util::sync::CancellationToken;
