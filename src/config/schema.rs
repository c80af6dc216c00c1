//! `bmocha.toml` schema

use serde::Deserialize;

/// Defaults applied before the command line is scanned.
///
/// Scalars are overridden by flags; lists are extended by them.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields, rename_all = "kebab-case")]
pub struct FileDefaults {
    pub colors: Option<bool>,

    pub bail: Option<bool>,

    /// Reporter name (spec, json, json-stream)
    pub reporter: Option<String>,

    /// Same syntax as `--reporter-options`
    pub reporter_options: Option<String>,

    pub slow: Option<u32>,

    pub timeout: Option<u32>,

    pub timeouts: Option<bool>,

    pub retries: Option<u32>,

    pub sort: Option<bool>,

    pub recursive: Option<bool>,

    pub exit: Option<bool>,

    pub console: Option<bool>,

    /// Modules to load before the tests
    pub require: Vec<String>,

    /// Files to load before positional arguments
    pub file: Vec<String>,

    /// Basenames to skip
    pub exclude: Vec<String>,

    /// Browser command for `--open`; unlike `--cmd` it does not imply serving
    pub browser_command: Option<String>,
}
