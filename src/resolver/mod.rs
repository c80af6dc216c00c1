//! Test file discovery
//!
//! Expands file and directory arguments into the ordered list of `.js` test
//! files for a run. Traversal is bounded to direct children unless recursion
//! is requested.

mod modules;

use std::collections::HashSet;
use std::io;
use std::ops::Deref;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::config::RunConfig;
use crate::utils;

pub use modules::{Module, ModuleRegistry, ModuleResolver};

/// Ordered absolute paths of existing `.js` test files
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveredFiles(Vec<PathBuf>);

impl DiscoveredFiles {
    pub fn into_vec(self) -> Vec<PathBuf> {
        self.0
    }
}

impl Deref for DiscoveredFiles {
    type Target = [PathBuf];

    fn deref(&self) -> &[PathBuf] {
        &self.0
    }
}

impl IntoIterator for DiscoveredFiles {
    type Item = PathBuf;
    type IntoIter = std::vec::IntoIter<PathBuf>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Expands file arguments into a [`DiscoveredFiles`] set
#[derive(Debug, Clone)]
pub struct FileResolver {
    cwd: PathBuf,
    excludes: HashSet<String>,
    recursive: bool,
    sort: bool,
}

impl FileResolver {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            excludes: HashSet::new(),
            recursive: false,
            sort: false,
        }
    }

    pub fn from_config(cwd: &Path, config: &RunConfig) -> Self {
        Self::new(cwd)
            .excludes(config.excludes.clone())
            .recursive(config.recursive)
            .sort(config.sort)
    }

    pub fn excludes(mut self, excludes: HashSet<String>) -> Self {
        self.excludes = excludes;
        self
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn sort(mut self, sort: bool) -> Self {
        self.sort = sort;
        self
    }

    /// Resolve `--file` entries followed by positional arguments.
    pub fn resolve<P: AsRef<Path>>(
        &self,
        files: &[P],
        file_flags: &[PathBuf],
    ) -> Result<DiscoveredFiles> {
        let mut inputs: Vec<PathBuf> = file_flags
            .iter()
            .map(|file| utils::absolutize(&self.cwd, file))
            .collect();

        inputs.extend(files.iter().map(|file| utils::absolutize(&self.cwd, file)));

        if inputs.is_empty() {
            inputs = default_inputs(&self.cwd)?;
        }

        let mut found = flatten(&inputs, self.recursive)?;

        found.retain(|path| !is_excluded(path, &self.excludes));

        if self.sort {
            found.sort_by(|a, b| a.as_os_str().cmp(b.as_os_str()));
        }

        debug!("Discovered {} test file(s)", found.len());

        Ok(DiscoveredFiles(found))
    }
}

/// Inputs used when no files were given: `test/` if it is a directory,
/// otherwise `test.js` if it exists, otherwise nothing.
pub fn default_inputs(cwd: &Path) -> Result<Vec<PathBuf>> {
    let dir = cwd.join("test");
    let meta = utils::stat(&dir).with_context(|| format!("Failed to stat {}", dir.display()))?;
    if meta.is_some_and(|meta| meta.is_dir()) {
        return Ok(vec![dir]);
    }

    let file = cwd.join("test.js");
    if utils::exists(&file).with_context(|| format!("Failed to stat {}", file.display()))? {
        return Ok(vec![file]);
    }

    Ok(Vec::new())
}

/// Collect `.js` files below `paths`, in traversal order.
///
/// Without recursion only a path itself or its direct children are
/// considered. Missing paths, non-`.js` files and directories past the depth
/// limit are skipped.
pub fn flatten(paths: &[PathBuf], recursive: bool) -> Result<Vec<PathBuf>> {
    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = Vec::new();

    for path in paths {
        let walker = WalkDir::new(path)
            .follow_links(true)
            .max_depth(max_depth)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if is_not_found(&e) => {
                    warn!("Skipping {}: not found", e.path().unwrap_or(path).display());
                    continue;
                }
                Err(e) => {
                    return Err(e).with_context(|| format!("Failed to read {}", path.display()));
                }
            };

            if entry.file_type().is_file() && is_js(entry.path()) {
                files.push(entry.into_path());
            }
        }
    }

    Ok(files)
}

fn is_not_found(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}

fn is_js(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "js")
}

fn is_excluded(path: &Path, excludes: &HashSet<String>) -> bool {
    path.file_name()
        .is_some_and(|name| excludes.contains(name.to_string_lossy().as_ref()))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use pretty_assertions::assert_eq;

    use super::*;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    /// test/c.js, test/a/b.js, test/a/deep/d.js, test/notes.txt
    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "test/c.js");
        touch(dir.path(), "test/a/b.js");
        touch(dir.path(), "test/a/deep/d.js");
        touch(dir.path(), "test/notes.txt");
        touch(dir.path(), "test/a/readme.md");
        dir
    }

    fn rel(root: &Path, files: &[PathBuf]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.strip_prefix(root).unwrap().display().to_string())
            .collect()
    }

    #[test]
    fn test_flatten_direct_children_only() {
        let dir = tree();
        let files = flatten(&[dir.path().join("test")], false).unwrap();
        assert_eq!(rel(dir.path(), &files), vec!["test/c.js"]);
    }

    #[test]
    fn test_flatten_recursive() {
        let dir = tree();
        let mut files = rel(dir.path(), &flatten(&[dir.path().join("test")], true).unwrap());
        files.sort();
        assert_eq!(files, vec!["test/a/b.js", "test/a/deep/d.js", "test/c.js"]);
    }

    #[test]
    fn test_flatten_skips_missing_and_non_js() {
        let dir = tree();
        let inputs = [
            dir.path().join("missing.js"),
            dir.path().join("test/notes.txt"),
            dir.path().join("test/c.js"),
        ];
        let files = flatten(&inputs, false).unwrap();
        assert_eq!(rel(dir.path(), &files), vec!["test/c.js"]);
    }

    #[test]
    fn test_resolve_recursive_scenario() {
        let dir = tree();
        let files = FileResolver::new(dir.path())
            .recursive(true)
            .sort(true)
            .resolve(&["test/".to_string()], &[])
            .unwrap();
        assert_eq!(
            rel(dir.path(), &files),
            vec!["test/a/b.js", "test/a/deep/d.js", "test/c.js"]
        );
    }

    #[test]
    fn test_exclude_matches_basename_at_any_depth() {
        let dir = tree();
        touch(dir.path(), "test/a/c.js");
        let excludes: HashSet<String> = ["c.js".to_string()].into_iter().collect();
        let files = FileResolver::new(dir.path())
            .recursive(true)
            .sort(true)
            .excludes(excludes)
            .resolve(&["test".to_string()], &[])
            .unwrap();
        assert_eq!(rel(dir.path(), &files), vec!["test/a/b.js", "test/a/deep/d.js"]);
    }

    #[test]
    fn test_exclude_is_exact_not_pattern() {
        let dir = tree();
        let excludes: HashSet<String> = ["*.js".to_string(), "c".to_string()].into_iter().collect();
        let files = FileResolver::new(dir.path())
            .excludes(excludes)
            .resolve(&["test".to_string()], &[])
            .unwrap();
        assert_eq!(rel(dir.path(), &files), vec!["test/c.js"]);
    }

    #[test]
    fn test_input_order_preserved_without_sort() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.js");
        touch(dir.path(), "a.js");
        touch(dir.path(), "z.js");
        let resolver = FileResolver::new(dir.path());

        let files = resolver
            .resolve(&["b.js".to_string(), "a.js".to_string()], &[dir.path().join("z.js")])
            .unwrap();
        assert_eq!(rel(dir.path(), &files), vec!["z.js", "b.js", "a.js"]);

        let sorted = resolver
            .sort(true)
            .resolve(&["b.js".to_string(), "a.js".to_string()], &[])
            .unwrap();
        assert_eq!(rel(dir.path(), &sorted), vec!["a.js", "b.js"]);
    }

    #[test]
    fn test_sort_is_by_path_string() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "a/x.js");
        touch(dir.path(), "a-b.js");
        let files = FileResolver::new(dir.path())
            .sort(true)
            .resolve(&["a".to_string(), "a-b.js".to_string()], &[])
            .unwrap();
        assert_eq!(rel(dir.path(), &files), vec!["a-b.js", "a/x.js"]);

        let again = FileResolver::new(dir.path())
            .sort(true)
            .resolve(&["a-b.js".to_string(), "a".to_string()], &[])
            .unwrap();
        assert_eq!(files, again);
    }

    #[test]
    fn test_default_inputs() {
        let dir = tempfile::tempdir().unwrap();
        assert!(default_inputs(dir.path()).unwrap().is_empty());

        touch(dir.path(), "test.js");
        assert_eq!(default_inputs(dir.path()).unwrap(), vec![dir.path().join("test.js")]);

        fs::create_dir(dir.path().join("test")).unwrap();
        assert_eq!(default_inputs(dir.path()).unwrap(), vec![dir.path().join("test")]);
    }

    #[test]
    fn test_resolve_uses_default_inputs() {
        let dir = tree();
        let files = FileResolver::new(dir.path()).resolve::<PathBuf>(&[], &[]).unwrap();
        assert_eq!(rel(dir.path(), &files), vec!["test/c.js"]);
    }
}
