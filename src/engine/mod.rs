//! Test-execution engine seam
//!
//! The orchestrator only configures an [`Engine`] and hands it loader thunks
//! in run order. [`NodeRunner`] is the engine used by the binary.

mod reporter;
mod runner;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;

use crate::config::RunConfig;
use crate::error::LoadError;
use crate::resolver::Module;

pub use reporter::{
    create_reporter, Reporter, ReporterKind, ReporterOption, ReporterOptions, RunStats, TestOutcome,
    TestReport,
};
pub use runner::NodeRunner;

/// Loads (or reloads) one test file. Every call reads the file fresh.
pub type Loader = Box<dyn Fn() -> Result<Arc<Module>, LoadError> + Send + Sync>;

/// Engine settings copied from the run configuration
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    pub colors: Option<bool>,
    pub bail: bool,
    pub grep: Option<Regex>,
    pub fgrep: Option<String>,
    pub invert: bool,
    pub slow: u32,
    pub timeout: u32,
    pub timeouts: bool,
    pub retries: u32,
    pub console: bool,
    pub windows: bool,
    /// Required modules already loaded by the orchestrator, in load order
    pub preloads: Vec<PathBuf>,
}

impl EngineOptions {
    pub fn from_config(config: &RunConfig) -> Self {
        Self {
            colors: config.colors,
            bail: config.bail,
            grep: config.grep.clone(),
            fgrep: config.fgrep.clone(),
            invert: config.invert,
            slow: config.slow,
            timeout: config.timeout,
            timeouts: config.timeouts,
            retries: config.retries,
            console: config.console,
            windows: cfg!(windows),
            preloads: Vec::new(),
        }
    }

    /// Whether a test with this title is selected by grep/fgrep/invert.
    pub fn matches(&self, title: &str) -> bool {
        let hit = match (&self.grep, &self.fgrep) {
            (Some(pattern), _) => pattern.is_match(title),
            (None, Some(needle)) => title.contains(needle.as_str()),
            (None, None) => return true,
        };

        hit != self.invert
    }

    /// Effective timeout, `None` when disabled.
    pub fn time_limit(&self) -> Option<Duration> {
        if self.timeouts && self.timeout > 0 {
            Some(Duration::from_millis(u64::from(self.timeout)))
        } else {
            None
        }
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(u64::from(self.slow))
    }
}

/// A test-execution engine
#[async_trait]
pub trait Engine: Send {
    fn options(&self) -> &EngineOptions;

    fn options_mut(&mut self) -> &mut EngineOptions;

    /// Select the output format for the next run
    fn configure_reporting(&mut self, kind: ReporterKind, options: &ReporterOptions) -> Result<()>;

    /// Run the loaded files in order; the result is the process exit code.
    async fn run(&mut self, loaders: Vec<Loader>) -> Result<i32>;
}
