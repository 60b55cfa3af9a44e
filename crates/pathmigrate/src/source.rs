//! Read-only migration trees.
//!
//! The engine and the planner only ever see a [`FileSource`]. Two backings
//! are provided:
//!
//! - [`DirSource`] reads a directory on the real filesystem.
//! - [`MemorySource`] holds a tree in memory, typically built from files
//!   compiled into the binary (see [`MemorySource::from_embed`] behind the
//!   `embed` feature).
//!
//! Paths handed to a source are logical: `/test/inner` and `test/inner` both
//! name the `test/inner` directory below the source's root, so the same
//! path works against either backing.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::Read;
use std::path::PathBuf;

use pathmigrate_core::{MigrateError, PathMigrateResult};

/// One entry of a listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEntry {
    /// Base name of the entry.
    pub name: String,
    /// Whether the entry is a directory.
    pub is_dir: bool,
}

impl SourceEntry {
    /// Creates a file entry.
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
        }
    }

    /// Creates a directory entry.
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
        }
    }
}

/// A hierarchical, read-only store of migration files.
///
/// Errors are surfaced unmodified: [`MigrateError::NotFound`],
/// [`MigrateError::NotADirectory`], or [`MigrateError::Io`].
pub trait FileSource: Send + Sync {
    /// Opens the file at `path` for reading.
    fn open(&self, path: &str) -> PathMigrateResult<Box<dyn Read + Send + '_>>;

    /// Lists the entries of the directory at `path`, sorted by name.
    fn list(&self, path: &str) -> PathMigrateResult<Vec<SourceEntry>>;

    /// Reads the whole file at `path` as UTF-8 text.
    fn read_to_string(&self, path: &str) -> PathMigrateResult<String> {
        let mut reader = self.open(path)?;
        let mut content = String::new();
        reader
            .read_to_string(&mut content)
            .map_err(|e| MigrateError::from_io(normalize(path), e))?;
        Ok(content)
    }

    /// Recursively enumerates every directory below and including `root`.
    ///
    /// Directories are returned parent first, siblings in name order. A
    /// directory whose base name satisfies `skip` is left out together with
    /// its whole subtree; `root` itself is never skipped.
    fn walk_dirs(&self, root: &str, skip: &dyn Fn(&str) -> bool) -> PathMigrateResult<Vec<String>> {
        let mut dirs = Vec::new();
        let mut stack = vec![normalize(root)];

        while let Some(dir) = stack.pop() {
            let children: Vec<String> = self
                .list(&dir)?
                .into_iter()
                .filter(|entry| entry.is_dir && !skip(&entry.name))
                .map(|entry| join(&dir, &entry.name))
                .collect();

            dirs.push(dir);
            // Reversed so the first sibling is popped first.
            stack.extend(children.into_iter().rev());
        }

        Ok(dirs)
    }
}

/// Normalizes a logical path to its `/`-prefixed form without trailing slash.
///
/// `""`, `"."`, and `"/"` all map to `"/"`; `.` segments and repeated
/// separators are dropped.
pub fn normalize(path: &str) -> String {
    let segments: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    format!("/{}", segments.join("/"))
}

/// Joins a logical directory path and an entry name.
pub fn join(dir: &str, name: &str) -> String {
    let dir = normalize(dir);
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// Splits a logical path into its segments relative to the source root.
///
/// `..` segments are refused so a path can never escape the root.
fn relative(path: &str) -> PathMigrateResult<String> {
    let normalized = normalize(path);
    if normalized.split('/').any(|s| s == "..") {
        return Err(MigrateError::NotFound(normalized));
    }
    Ok(normalized.trim_start_matches('/').to_string())
}

// ── Filesystem backing ──────────────────────────────────────────────

/// A [`FileSource`] reading a directory of the real filesystem.
#[derive(Debug, Clone)]
pub struct DirSource {
    root: PathBuf,
}

impl DirSource {
    /// Creates a source rooted at `root`.
    ///
    /// The directory is not checked here; a missing root surfaces as
    /// [`MigrateError::NotFound`] on first use.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathMigrateResult<PathBuf> {
        let rel = relative(path)?;
        Ok(if rel.is_empty() {
            self.root.clone()
        } else {
            self.root.join(rel)
        })
    }
}

impl FileSource for DirSource {
    fn open(&self, path: &str) -> PathMigrateResult<Box<dyn Read + Send + '_>> {
        let full = self.resolve(path)?;
        let metadata = std::fs::metadata(&full).map_err(|e| MigrateError::from_io(normalize(path), e))?;
        if metadata.is_dir() {
            return Err(MigrateError::Io {
                path: normalize(path),
                source: std::io::Error::new(std::io::ErrorKind::Other, "is a directory"),
            });
        }
        let file = std::fs::File::open(&full).map_err(|e| MigrateError::from_io(normalize(path), e))?;
        Ok(Box::new(file))
    }

    fn list(&self, path: &str) -> PathMigrateResult<Vec<SourceEntry>> {
        let full = self.resolve(path)?;
        let metadata = std::fs::metadata(&full).map_err(|e| MigrateError::from_io(normalize(path), e))?;
        if !metadata.is_dir() {
            return Err(MigrateError::NotADirectory(normalize(path)));
        }

        let read_dir = std::fs::read_dir(&full).map_err(|e| MigrateError::from_io(normalize(path), e))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            let entry = entry.map_err(|e| MigrateError::from_io(normalize(path), e))?;
            let name = entry.file_name().to_string_lossy().to_string();
            // Symlinks are not followed; a link to a directory is never walked.
            let is_dir = entry
                .file_type()
                .map_err(|e| MigrateError::from_io(normalize(path), e))?
                .is_dir();
            entries.push(SourceEntry { name, is_dir });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

// ── In-memory backing ───────────────────────────────────────────────

/// A [`FileSource`] holding its whole tree in memory.
///
/// Directories are implied by the files added below them; empty directories
/// can be added with [`MemorySource::with_dir`].
///
/// # Examples
///
/// ```
/// use pathmigrate::source::{FileSource, MemorySource};
///
/// let source = MemorySource::new()
///     .with_file("/1_users.sql", "CREATE TABLE users (id INT);")
///     .with_file("/billing/1_invoices.sql", "CREATE TABLE invoices (id INT);");
///
/// let names: Vec<_> = source.list("/").unwrap().into_iter().map(|e| e.name).collect();
/// assert_eq!(names, vec!["1_users.sql", "billing"]);
/// ```
#[derive(Clone, Default)]
pub struct MemorySource {
    files: BTreeMap<String, Vec<u8>>,
    dirs: BTreeSet<String>,
}

impl MemorySource {
    /// Creates an empty tree containing only the root directory.
    pub fn new() -> Self {
        let mut dirs = BTreeSet::new();
        dirs.insert(String::new());
        Self {
            files: BTreeMap::new(),
            dirs,
        }
    }

    /// Adds a file, creating its parent directories.
    #[must_use]
    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        let key = normalize(path).trim_start_matches('/').to_string();
        self.add_parents(&key);
        self.files.insert(key, content.into());
        self
    }

    /// Adds a directory, creating its parents.
    #[must_use]
    pub fn with_dir(mut self, path: &str) -> Self {
        let key = normalize(path).trim_start_matches('/').to_string();
        self.add_parents(&key);
        self.dirs.insert(key);
        self
    }

    /// Returns a new source rooted at the directory `prefix` of this one.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::NotFound`] if `prefix` is not a directory of
    /// this tree.
    pub fn subtree(&self, prefix: &str) -> PathMigrateResult<Self> {
        let key = relative(prefix)?;
        if !self.dirs.contains(&key) {
            return Err(MigrateError::NotFound(normalize(prefix)));
        }

        let strip = |k: &str| -> Option<String> {
            if key.is_empty() {
                Some(k.to_string())
            } else if k == key {
                Some(String::new())
            } else {
                k.strip_prefix(&format!("{key}/")).map(str::to_string)
            }
        };

        let mut sub = Self::new();
        for dir in &self.dirs {
            if let Some(stripped) = strip(dir) {
                sub.dirs.insert(stripped);
            }
        }
        for (file, content) in &self.files {
            if let Some(stripped) = strip(file) {
                sub.files.insert(stripped, content.clone());
            }
        }
        Ok(sub)
    }

    /// Builds a tree from the files of a [`rust_embed::RustEmbed`] type,
    /// keeping only those below `prefix` (which becomes the root).
    #[cfg(feature = "embed")]
    pub fn from_embed<E: rust_embed::RustEmbed>(prefix: &str) -> Self {
        let prefix = normalize(prefix).trim_start_matches('/').to_string();
        let mut source = Self::new();

        for name in E::iter() {
            let name = name.as_ref();
            let rel = if prefix.is_empty() {
                Some(name)
            } else {
                name.strip_prefix(prefix.as_str())
                    .and_then(|rest| rest.strip_prefix('/'))
            };
            if let (Some(rel), Some(file)) = (rel, E::get(name)) {
                source = source.with_file(rel, file.data.into_owned());
            }
        }

        source
    }

    fn add_parents(&mut self, key: &str) {
        let mut current = String::new();
        self.dirs.insert(String::new());
        let segments: Vec<&str> = key.split('/').collect();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            if !current.is_empty() {
                current.push('/');
            }
            current.push_str(segment);
            self.dirs.insert(current.clone());
        }
    }
}

/// Splits a relative key into `(parent, base)`.
fn split_key(key: &str) -> (&str, &str) {
    key.rsplit_once('/').unwrap_or(("", key))
}

impl FileSource for MemorySource {
    fn open(&self, path: &str) -> PathMigrateResult<Box<dyn Read + Send + '_>> {
        let key = relative(path)?;
        match self.files.get(&key) {
            Some(content) => Ok(Box::new(std::io::Cursor::new(content.as_slice()))),
            None if self.dirs.contains(&key) => Err(MigrateError::Io {
                path: normalize(path),
                source: std::io::Error::new(std::io::ErrorKind::Other, "is a directory"),
            }),
            None => Err(MigrateError::NotFound(normalize(path))),
        }
    }

    fn list(&self, path: &str) -> PathMigrateResult<Vec<SourceEntry>> {
        let key = relative(path)?;
        if self.files.contains_key(&key) {
            return Err(MigrateError::NotADirectory(normalize(path)));
        }
        if !self.dirs.contains(&key) {
            return Err(MigrateError::NotFound(normalize(path)));
        }

        let child_dirs = self
            .dirs
            .iter()
            .filter(|d| !d.is_empty() && split_key(d).0 == key)
            .map(|d| SourceEntry::dir(split_key(d).1));
        let child_files = self
            .files
            .keys()
            .filter(|f| split_key(f).0 == key)
            .map(|f| SourceEntry::file(split_key(f).1));

        let mut entries: Vec<SourceEntry> = child_dirs.chain(child_files).collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

impl fmt::Debug for MemorySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemorySource")
            .field("dirs", &self.dirs.len())
            .field("files", &self.files.keys().collect::<Vec<_>>())
            .finish()
    }
}
