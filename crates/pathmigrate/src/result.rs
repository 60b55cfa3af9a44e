//! Output values of a migration run.

use serde::Serialize;

/// Versions of one path before and after a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathVersions {
    /// The migration path, e.g. `/` or `/test/inner`.
    pub path: String,
    /// Last applied version when the path was reached.
    pub previous_version: i64,
    /// Last applied version when the path was done.
    pub new_version: i64,
}

impl PathVersions {
    /// Whether any file was applied at this path.
    pub const fn changed(&self) -> bool {
        self.new_version != self.previous_version
    }
}

/// Per-path outcome of a successful run, in processing order.
///
/// Every visited path is present, including those with nothing pending.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MigrateResult {
    paths: Vec<PathVersions>,
}

impl MigrateResult {
    /// Appends the outcome of `path`.
    pub(crate) fn push(&mut self, path: &str, previous_version: i64, new_version: i64) {
        self.paths.push(PathVersions {
            path: path.to_string(),
            previous_version,
            new_version,
        });
    }

    /// Returns the outcome of `path`, if it was visited.
    pub fn get(&self, path: &str) -> Option<&PathVersions> {
        self.paths.iter().find(|p| p.path == path)
    }

    /// Iterates the outcomes in processing order.
    pub fn iter(&self) -> std::slice::Iter<'_, PathVersions> {
        self.paths.iter()
    }

    /// Returns the visited paths in processing order.
    pub fn paths(&self) -> Vec<&str> {
        self.paths.iter().map(|p| p.path.as_str()).collect()
    }

    /// Number of visited paths.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Whether no path was visited.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Whether any path applied at least one file.
    pub fn any_changed(&self) -> bool {
        self.paths.iter().any(PathVersions::changed)
    }
}

impl<'a> IntoIterator for &'a MigrateResult {
    type Item = &'a PathVersions;
    type IntoIter = std::slice::Iter<'a, PathVersions>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A file that would be applied by the next run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingFile {
    /// The migration path the file belongs to.
    pub path: String,
    /// Base name of the file.
    pub name: String,
    /// Full logical path of the file within the source.
    pub file_path: String,
    /// Version parsed from the name.
    pub version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_lookup_and_order() {
        let mut result = MigrateResult::default();
        result.push("/test/inner", 0, 1);
        result.push("/", 2, 2);

        assert_eq!(result.paths(), vec!["/test/inner", "/"]);
        assert!(result.get("/test/inner").unwrap().changed());
        assert!(!result.get("/").unwrap().changed());
        assert!(result.get("/missing").is_none());
        assert!(result.any_changed());
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_result_serializes_as_list() {
        let mut result = MigrateResult::default();
        result.push("/", 0, 3);
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{"path": "/", "previous_version": 0, "new_version": 3}])
        );
    }
}
