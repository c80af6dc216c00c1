//! Command-line interface for bmocha
//!
//! Turns argv into a [`RunConfig`] or one of the informational requests
//! (`--version`, `--help`, `--reporters`).

mod args;
mod help;

use crate::config::RunConfig;

pub use args::{parse_reporter_options, ConfigBuilder};
pub use help::{help_text, reporters_text, version_text};

/// Result of scanning the command line
#[derive(Debug)]
pub enum Parsed {
    /// Discover files and dispatch
    Run(Box<RunConfig>),
    Version,
    Help,
    Reporters,
}
