//! Module resolution and the per-run module registry
//!
//! Required modules and test files are loaded through an explicit registry
//! keyed by resolved path. Reloading a file means invalidating its entry
//! first, so repeated loads within one process see the current file contents.

use std::collections::HashMap;
use std::ffi::OsString;
use std::fs::{self, Metadata};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::LoadError;
use crate::utils;

/// A loaded source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Absolute path the module was loaded from
    pub path: PathBuf,

    /// Source text at load time
    pub source: String,
}

/// Resolves module requests against an ordered list of search paths
#[derive(Debug, Clone, Default)]
pub struct ModuleResolver {
    search_paths: Vec<PathBuf>,
}

impl ModuleResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search `dir`, then `dir/node_modules`, so bare names resolve as if installed.
    pub fn for_directory(dir: &Path) -> Self {
        let mut resolver = Self::new();
        resolver.add_search_path(dir.to_path_buf());
        resolver.add_search_path(dir.join("node_modules"));
        resolver
    }

    pub fn add_search_path(&mut self, dir: PathBuf) {
        if !self.search_paths.contains(&dir) {
            self.search_paths.push(dir);
        }
    }

    /// Resolve a request to an absolute file path
    pub fn resolve(&self, request: &str) -> Result<PathBuf, LoadError> {
        let requested = Path::new(request);

        if requested.is_absolute() {
            return resolve_file(requested)?
                .ok_or_else(|| LoadError::ModuleNotFound(request.to_string()));
        }

        for dir in &self.search_paths {
            if let Some(found) = resolve_file(&dir.join(requested))? {
                debug!("Resolved '{}' to {}", request, found.display());
                return Ok(found);
            }
        }

        Err(LoadError::ModuleNotFound(request.to_string()))
    }
}

/// Try `target`, `target.js`, then `target` as a package directory.
fn resolve_file(target: &Path) -> Result<Option<PathBuf>, LoadError> {
    let meta = stat(target)?;
    if meta.as_ref().is_some_and(Metadata::is_file) {
        return Ok(Some(target.to_path_buf()));
    }

    let with_js = with_js_suffix(target);
    if stat(&with_js)?.is_some_and(|meta| meta.is_file()) {
        return Ok(Some(with_js));
    }

    if meta.is_some_and(|meta| meta.is_dir()) {
        return resolve_package(target);
    }

    Ok(None)
}

/// Resolve a package directory through `package.json` `main`, then `index.js`.
fn resolve_package(dir: &Path) -> Result<Option<PathBuf>, LoadError> {
    let package_json = dir.join("package.json");

    if stat(&package_json)?.is_some() {
        if let Some(main) = read_main(&package_json) {
            let entry = dir.join(main);
            for candidate in [entry.clone(), with_js_suffix(&entry), entry.join("index.js")] {
                if stat(&candidate)?.is_some_and(|meta| meta.is_file()) {
                    return Ok(Some(candidate));
                }
            }
        }
    }

    let index = dir.join("index.js");
    if stat(&index)?.is_some_and(|meta| meta.is_file()) {
        return Ok(Some(index));
    }

    Ok(None)
}

fn read_main(package_json: &Path) -> Option<String> {
    let content = match fs::read_to_string(package_json) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read {}: {}", package_json.display(), e);
            return None;
        }
    };

    match serde_json::from_str::<serde_json::Value>(&content) {
        Ok(pkg) => pkg.get("main").and_then(|v| v.as_str()).map(str::to_string),
        Err(e) => {
            warn!("Failed to parse {}: {}", package_json.display(), e);
            None
        }
    }
}

fn with_js_suffix(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".js");
    PathBuf::from(name)
}

fn stat(path: &Path) -> Result<Option<Metadata>, LoadError> {
    utils::stat(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Cache of loaded modules keyed by resolved path
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    resolver: ModuleResolver,
    cache: HashMap<PathBuf, Arc<Module>>,
}

impl ModuleRegistry {
    pub fn new(resolver: ModuleResolver) -> Self {
        Self {
            resolver,
            cache: HashMap::new(),
        }
    }

    /// Resolve a request and load it
    pub fn require(&mut self, request: &str) -> Result<Arc<Module>, LoadError> {
        let path = self.resolver.resolve(request)?;
        self.load(&path)
    }

    /// Load the module at `path`, reusing the cached copy if there is one.
    pub fn load(&mut self, path: &Path) -> Result<Arc<Module>, LoadError> {
        if let Some(module) = self.cache.get(path) {
            return Ok(module.clone());
        }

        let source = fs::read_to_string(path).map_err(|source| {
            if source.kind() == io::ErrorKind::NotFound {
                LoadError::ModuleNotFound(path.display().to_string())
            } else {
                LoadError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;

        let module = Arc::new(Module {
            path: path.to_path_buf(),
            source,
        });
        self.cache.insert(path.to_path_buf(), module.clone());

        Ok(module)
    }

    /// Drop the cached entry for `path`. Returns whether one existed.
    pub fn invalidate(&mut self, path: &Path) -> bool {
        self.cache.remove(path).is_some()
    }

    pub fn is_loaded(&self, path: &Path) -> bool {
        self.cache.contains_key(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_resolve_exact_and_js_suffix() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("setup.js"), "");
        let resolver = ModuleResolver::for_directory(dir.path());

        assert_eq!(resolver.resolve("setup.js").unwrap(), dir.path().join("setup.js"));
        assert_eq!(resolver.resolve("setup").unwrap(), dir.path().join("setup.js"));
    }

    #[test]
    fn test_resolve_bare_name_from_node_modules() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("node_modules").join("should");
        write(&pkg.join("package.json"), r#"{ "main": "lib/should" }"#);
        write(&pkg.join("lib").join("should.js"), "");
        write(&dir.path().join("node_modules").join("plain").join("index.js"), "");
        let resolver = ModuleResolver::for_directory(dir.path());

        assert_eq!(resolver.resolve("should").unwrap(), pkg.join("lib").join("should.js"));
        assert_eq!(
            resolver.resolve("plain").unwrap(),
            dir.path().join("node_modules").join("plain").join("index.js")
        );
    }

    #[test]
    fn test_resolve_missing_module() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = ModuleResolver::for_directory(dir.path());

        let err = resolver.resolve("nope").unwrap_err();
        assert_eq!(err.to_string(), "Cannot find module 'nope'.");
    }

    #[test]
    fn test_registry_invalidate_observes_changes() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("a.js");
        write(&file, "one");
        let mut registry = ModuleRegistry::new(ModuleResolver::for_directory(dir.path()));

        assert_eq!(registry.load(&file).unwrap().source, "one");
        write(&file, "two");
        assert_eq!(registry.load(&file).unwrap().source, "one");

        assert!(registry.invalidate(&file));
        assert!(!registry.is_loaded(&file));
        assert_eq!(registry.load(&file).unwrap().source, "two");
    }

    #[test]
    fn test_registry_require_caches_by_path() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("helper.js"), "x");
        let mut registry = ModuleRegistry::new(ModuleResolver::for_directory(dir.path()));

        let first = registry.require("helper").unwrap();
        let second = registry.require("helper.js").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(registry.is_loaded(&dir.path().join("helper.js")));
    }
}
