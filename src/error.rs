//! Error types for bmocha.
//!
//! Usage errors are recovered locally by the lifecycle into an exit code of 1
//! and are never sent down the `anyhow` channel. Everything that escapes as an
//! `anyhow::Error` is fatal.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Bad, missing or out-of-range flag value, or an unrecognized flag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// A flag that requires a value got none (or an empty one).
    #[error("Invalid option for: {0}.")]
    MissingValue(String),

    /// A token that looks like a flag but is not one.
    #[error("Invalid argument: {0}.")]
    UnknownArgument(String),

    #[error("Invalid reporter: '{0}'.")]
    InvalidReporter(String),

    #[error("Invalid reporter option: '{0}'.")]
    InvalidReporterOption(String),

    #[error("Invalid port: {0}.")]
    InvalidPort(String),

    #[error("Invalid pattern for: {flag}.")]
    InvalidPattern { flag: String },
}

/// Problems with the `bmocha.toml` defaults file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value in {}: {source}", .path.display())]
    Value {
        path: PathBuf,
        #[source]
        source: UsageError,
    },
}

/// Everything that can stop argument scanning.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A stat failure other than "not found" while probing `--require` paths.
    #[error("Could not probe {}: {source}", .path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A required module or test file that could not be located or read.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Cannot find module '{0}'.")]
    ModuleNotFound(String),

    #[error("Could not find test file: {}.", .0.display())]
    TestFileNotFound(PathBuf),

    #[error("Could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Non-fatal error reported by the browser server.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct ServerError(pub String);

impl ServerError {
    pub fn new(err: impl std::fmt::Display) -> Self {
        Self(err.to_string())
    }
}
