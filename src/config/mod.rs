//! Run configuration
//!
//! [`RunConfig`] is built once from `bmocha.toml` defaults and the command
//! line, then only read for the rest of the process.

mod schema;

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use crate::engine::{ReporterKind, ReporterOptions};
use crate::error::ConfigError;
use crate::utils;

pub use schema::FileDefaults;

/// Name of the optional defaults file in the working directory
pub const DEFAULTS_FILE: &str = "bmocha.toml";

/// Everything a run needs to know, as given on the command line
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Forced colors on/off; `None` lets the terminal decide
    pub colors: Option<bool>,
    pub bail: bool,
    pub grep: Option<Regex>,
    pub fgrep: Option<String>,
    pub invert: bool,
    /// Slow threshold in milliseconds
    pub slow: u32,
    /// Per-test timeout in milliseconds
    pub timeout: u32,
    pub timeouts: bool,
    pub retries: u32,
    pub reporter: ReporterKind,
    pub reporter_options: ReporterOptions,
    pub sort: bool,
    pub recursive: bool,
    /// Exit as soon as the run finishes, skipping runtime shutdown
    pub exit: bool,
    pub console: bool,
    /// Serve tests to a browser instead of running them locally
    pub listen: bool,
    /// Explicit port; `None` means pick one at dispatch time
    pub port: Option<u16>,
    pub open: bool,
    /// Browser command; may contain a `%s` URL placeholder
    pub command: Option<String>,
    /// Absolute paths, or bare module names resolved at load time
    pub requires: Vec<String>,
    /// Positional path arguments, unresolved
    pub files: Vec<PathBuf>,
    /// `--file` entries, absolute
    pub file_flags: Vec<PathBuf>,
    /// Basenames to leave out of discovery
    pub excludes: HashSet<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            colors: None,
            bail: false,
            grep: None,
            fgrep: None,
            invert: false,
            slow: 75,
            timeout: 2000,
            timeouts: true,
            retries: 0,
            reporter: ReporterKind::Spec,
            reporter_options: ReporterOptions::new(),
            sort: false,
            recursive: false,
            exit: false,
            console: false,
            listen: false,
            port: None,
            open: false,
            command: None,
            requires: Vec::new(),
            files: Vec::new(),
            file_flags: Vec::new(),
            excludes: HashSet::new(),
        }
    }
}

/// Load `bmocha.toml` from `dir`, if there is one.
pub fn load_defaults(dir: &Path) -> Result<Option<FileDefaults>, ConfigError> {
    let path = dir.join(DEFAULTS_FILE);

    let exists = utils::exists(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    if !exists {
        return Ok(None);
    }

    debug!("Loading defaults from {}", path.display());

    let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    let defaults = toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;

    Ok(Some(defaults))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RunConfig::default();
        assert_eq!(config.slow, 75);
        assert_eq!(config.timeout, 2000);
        assert!(config.timeouts);
        assert_eq!(config.reporter, ReporterKind::Spec);
        assert_eq!(config.port, None);
    }

    #[test]
    fn test_load_defaults_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_defaults(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_load_defaults_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(DEFAULTS_FILE),
            r#"
reporter = "json"
timeout = 5000
recursive = true
require = ["./setup"]
exclude = ["fixture.js"]
"#,
        )
        .unwrap();

        let defaults = load_defaults(dir.path()).unwrap().unwrap();
        assert_eq!(defaults.reporter.as_deref(), Some("json"));
        assert_eq!(defaults.timeout, Some(5000));
        assert_eq!(defaults.recursive, Some(true));
        assert_eq!(defaults.require, vec!["./setup"]);
        assert_eq!(defaults.exclude, vec!["fixture.js"]);
    }

    #[test]
    fn test_load_defaults_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DEFAULTS_FILE), "colour = true\n").unwrap();

        let err = load_defaults(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
