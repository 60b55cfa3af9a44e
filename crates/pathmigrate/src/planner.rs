//! Discovery and ordering of migration paths.

use std::collections::HashSet;

use pathmigrate_core::PathMigrateResult;

use crate::source::{normalize, FileSource};

/// Produces the ordered list of directories a run processes.
#[derive(Debug, Clone, Default)]
pub struct PathPlanner {
    skip_dirs: HashSet<String>,
    pre_folders: Vec<String>,
}

impl PathPlanner {
    /// Creates a planner excluding directories named in `skip_dirs`.
    pub fn new<I, S>(skip_dirs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            skip_dirs: skip_dirs.into_iter().map(Into::into).collect(),
            pre_folders: Vec::new(),
        }
    }

    /// Sets the paths moved to the front of the order.
    #[must_use]
    pub fn with_pre_folders<I, S>(mut self, pre_folders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.pre_folders = pre_folders
            .into_iter()
            .map(|p| normalize(p.as_ref()))
            .collect();
        self
    }

    /// Walks `source` from `root` and returns the migration paths in
    /// processing order.
    ///
    /// Paths are relative to `root`, which is itself reported as `/`.
    ///
    /// # Errors
    ///
    /// Propagates any [`FileSource`] error, e.g. a missing root.
    pub fn discover(&self, source: &dyn FileSource, root: &str) -> PathMigrateResult<Vec<String>> {
        let root = normalize(root);
        let dirs = source.walk_dirs(&root, &|name: &str| self.skip_dirs.contains(name))?;

        let discovered = dirs
            .into_iter()
            .map(|dir| relative_to(&root, &dir))
            .collect();

        Ok(self.reorder(discovered))
    }

    /// Moves every existing pre-folder to the front, in pre-folder order.
    fn reorder(&self, discovered: Vec<String>) -> Vec<String> {
        if self.pre_folders.is_empty() {
            return discovered;
        }

        let mut ordered = Vec::with_capacity(discovered.len());
        for pre in &self.pre_folders {
            if discovered.contains(pre) && !ordered.contains(pre) {
                ordered.push(pre.clone());
            }
        }
        for path in discovered {
            if !ordered.contains(&path) {
                ordered.push(path);
            }
        }
        ordered
    }
}

/// Re-expresses the logical `dir` relative to the logical `root`.
fn relative_to(root: &str, dir: &str) -> String {
    if root == "/" {
        return dir.to_string();
    }
    match dir.strip_prefix(root) {
        Some("") => "/".to_string(),
        Some(rest) => normalize(rest),
        None => dir.to_string(),
    }
}
