//! Default engine: runs each test file in the JavaScript runtime

use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::reporter::{
    create_reporter, Reporter, ReporterKind, ReporterOptions, RunStats, TestOutcome, TestReport,
};
use super::{Engine, EngineOptions, Loader};
use crate::resolver::Module;
use crate::utils;

/// Runtime used when none is given
pub const DEFAULT_RUNTIME: &str = "node";

/// Runs every loaded test file as a child process of the runtime.
///
/// Each file counts as one test; its title is the path relative to the
/// working directory. Preloaded modules are passed as `--require` arguments.
pub struct NodeRunner {
    runtime: OsString,
    cwd: PathBuf,
    options: EngineOptions,
    reporter: Option<Box<dyn Reporter>>,
}

struct Execution {
    outcome: TestOutcome,
    output: String,
    duration: Duration,
}

impl NodeRunner {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self::with_runtime(DEFAULT_RUNTIME, cwd)
    }

    pub fn with_runtime(runtime: impl Into<OsString>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            runtime: runtime.into(),
            cwd: cwd.into(),
            options: EngineOptions::default(),
            reporter: None,
        }
    }

    /// Use an explicit reporter instead of one built by `configure_reporting`.
    pub fn set_reporter(&mut self, reporter: Box<dyn Reporter>) {
        self.reporter = Some(reporter);
    }
}

/// Run one test file to completion.
///
/// Borrows the runner's parts only; its reporter is not `Sync`.
async fn execute(
    runtime: &OsStr,
    cwd: &Path,
    options: &EngineOptions,
    module: &Module,
) -> Result<Execution> {
    let mut command = Command::new(runtime);

    for preload in &options.preloads {
        command.arg("--require").arg(preload);
    }

    command
        .arg(&module.path)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .kill_on_drop(true);

    if options.console {
        command.stdout(Stdio::inherit()).stderr(Stdio::inherit());
    } else {
        command.stdout(Stdio::piped()).stderr(Stdio::piped());
    }

    let started = Instant::now();
    let child = command
        .spawn()
        .with_context(|| format!("Failed to start {}", runtime.to_string_lossy()))?;

    let waited = child.wait_with_output();
    let output = match options.time_limit() {
        Some(limit) => match tokio::time::timeout(limit, waited).await {
            Ok(output) => output?,
            // Dropping the wait future drops the child, which kills it.
            Err(_) => {
                return Ok(Execution {
                    outcome: TestOutcome::Failed(format!(
                        "Timeout of {}ms exceeded.",
                        options.timeout
                    )),
                    output: String::new(),
                    duration: started.elapsed(),
                });
            }
        },
        None => waited.await?,
    };

    let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
    captured.push_str(&String::from_utf8_lossy(&output.stderr));

    let outcome = if output.status.success() {
        TestOutcome::Passed
    } else {
        TestOutcome::Failed(describe(output.status))
    };

    Ok(Execution {
        outcome,
        output: captured,
        duration: started.elapsed(),
    })
}

fn describe(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("Exited with code {}.", code),
        None => "Terminated by a signal.".to_string(),
    }
}

#[async_trait]
impl Engine for NodeRunner {
    fn options(&self) -> &EngineOptions {
        &self.options
    }

    fn options_mut(&mut self) -> &mut EngineOptions {
        &mut self.options
    }

    fn configure_reporting(&mut self, kind: ReporterKind, options: &ReporterOptions) -> Result<()> {
        if let Some(colors) = self.options.colors {
            colored::control::set_override(colors);
        }

        let reporter = create_reporter(kind, options, self.options.windows, Box::new(io::stdout()))
            .with_context(|| format!("Failed to set up the {} reporter", kind.name()))?;
        self.reporter = Some(reporter);

        Ok(())
    }

    async fn run(&mut self, loaders: Vec<Loader>) -> Result<i32> {
        let mut reporter = match self.reporter.take() {
            Some(reporter) => reporter,
            None => create_reporter(
                ReporterKind::Spec,
                &ReporterOptions::new(),
                self.options.windows,
                Box::new(io::stdout()),
            )?,
        };

        let started = Instant::now();
        let mut stats = RunStats::default();

        reporter.start(loaders.len())?;

        for loader in &loaders {
            let module = loader()?;
            let title = utils::display_path(&self.cwd, &module.path);

            if !self.options.matches(&title) {
                debug!("Skipping {}: filtered out", title);
                continue;
            }

            let mut retry = 0;
            let mut execution = execute(&self.runtime, &self.cwd, &self.options, &module).await?;

            while execution.outcome != TestOutcome::Passed && retry < self.options.retries {
                retry += 1;
                debug!("Retrying {} ({}/{})", title, retry, self.options.retries);
                let module = loader()?;
                execution = execute(&self.runtime, &self.cwd, &self.options, &module).await?;
            }

            let passed = execution.outcome == TestOutcome::Passed;
            let report = TestReport {
                title,
                file: module.path.clone(),
                duration: execution.duration,
                slow: passed && execution.duration > self.options.slow_threshold(),
                retry,
                outcome: execution.outcome,
                output: execution.output,
            };

            stats.tests += 1;
            if passed {
                stats.passes += 1;
            } else {
                stats.failures += 1;
            }

            reporter.test_end(&report)?;

            if !passed && self.options.bail {
                break;
            }
        }

        stats.duration = started.elapsed();
        reporter.end(&stats)?;

        Ok(i32::try_from(stats.failures).unwrap_or(i32::MAX))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use serde_json::Value;

    use super::*;
    use crate::engine::reporter::tests::SharedBuf;
    use crate::resolver::{ModuleRegistry, ModuleResolver};

    /// Shell scripts named `.js` stand in for test files; `sh` is the runtime.
    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, body).unwrap();
        path
    }

    fn loaders(dir: &Path, files: &[PathBuf]) -> Vec<Loader> {
        let resolver = ModuleResolver::for_directory(dir);
        let registry = Arc::new(Mutex::new(ModuleRegistry::new(resolver)));
        files
            .iter()
            .cloned()
            .map(|path| {
                let registry = registry.clone();
                Box::new(move || {
                    let mut registry = registry.lock();
                    registry.invalidate(&path);
                    registry.load(&path)
                }) as Loader
            })
            .collect()
    }

    fn runner(dir: &Path, configure: impl FnOnce(&mut EngineOptions)) -> (NodeRunner, SharedBuf) {
        let buf = SharedBuf::default();
        let mut runner = NodeRunner::with_runtime("sh", dir);
        runner.options_mut().timeouts = true;
        runner.options_mut().timeout = 5000;
        configure(runner.options_mut());
        let reporter = create_reporter(
            ReporterKind::JsonStream,
            &ReporterOptions::new(),
            false,
            Box::new(buf.clone()),
        )
        .unwrap();
        runner.set_reporter(reporter);
        (runner, buf)
    }

    fn events(buf: &SharedBuf) -> Vec<(String, Value)> {
        buf.contents()
            .lines()
            .map(|line| {
                let value: Value = serde_json::from_str(line).unwrap();
                (value[0].as_str().unwrap().to_string(), value[1].clone())
            })
            .collect()
    }

    #[tokio::test]
    async fn test_counts_failures() {
        let dir = tempfile::tempdir().unwrap();
        let files = [
            script(dir.path(), "pass.js", "exit 0\n"),
            script(dir.path(), "fail.js", "echo broken; exit 3\n"),
        ];
        let (mut runner, buf) = runner(dir.path(), |_| {});

        let code = runner.run(loaders(dir.path(), &files)).await.unwrap();
        assert_eq!(code, 1);

        let events = events(&buf);
        assert_eq!(events[1].0, "pass");
        assert_eq!(events[1].1["title"], "pass.js");
        assert_eq!(events[2].0, "fail");
        assert_eq!(events[2].1["err"]["message"], "Exited with code 3.");
        assert!(events[2].1["err"]["output"].as_str().unwrap().contains("broken"));
    }

    #[tokio::test]
    async fn test_run_on_a_spawned_task() {
        let dir = tempfile::tempdir().unwrap();
        let files = [script(dir.path(), "pass.js", "exit 0\n")];
        let loaders = loaders(dir.path(), &files);
        let (mut runner, buf) = runner(dir.path(), |_| {});

        let code = tokio::spawn(async move { runner.run(loaders).await })
            .await
            .unwrap()
            .unwrap();
        assert_eq!(code, 0);
        assert_eq!(events(&buf).pop().unwrap().1["passes"], 1);
    }

    #[tokio::test]
    async fn test_bail_stops_after_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let files = [
            script(dir.path(), "a.js", "exit 1\n"),
            script(dir.path(), "b.js", "exit 1\n"),
        ];
        let (mut runner, buf) = runner(dir.path(), |opts| opts.bail = true);

        assert_eq!(runner.run(loaders(dir.path(), &files)).await.unwrap(), 1);
        let end = events(&buf).pop().unwrap();
        assert_eq!(end.0, "end");
        assert_eq!(end.1["tests"], 1);
    }

    #[tokio::test]
    async fn test_grep_filters_titles() {
        let dir = tempfile::tempdir().unwrap();
        let files = [
            script(dir.path(), "keep.js", "exit 0\n"),
            script(dir.path(), "drop.js", "exit 1\n"),
        ];
        let (mut runner, buf) = runner(dir.path(), |opts| opts.fgrep = Some("keep".into()));

        assert_eq!(runner.run(loaders(dir.path(), &files)).await.unwrap(), 0);
        assert_eq!(events(&buf).pop().unwrap().1["tests"], 1);
    }

    #[tokio::test]
    async fn test_retries_reload_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran-once");
        let body = format!(
            "if [ -e {m} ]; then exit 0; fi\ntouch {m}\nexit 1\n",
            m = marker.display()
        );
        let files = [script(dir.path(), "flaky.js", &body)];
        let (mut runner, buf) = runner(dir.path(), |opts| opts.retries = 1);

        assert_eq!(runner.run(loaders(dir.path(), &files)).await.unwrap(), 0);
        let events = events(&buf);
        assert_eq!(events[1].0, "pass");
        assert_eq!(events[1].1["currentRetry"], 1);
    }

    #[tokio::test]
    async fn test_timeout_kills_the_child() {
        let dir = tempfile::tempdir().unwrap();
        let files = [script(dir.path(), "hang.js", "sleep 5\n")];
        let (mut runner, buf) = runner(dir.path(), |opts| opts.timeout = 100);

        assert_eq!(runner.run(loaders(dir.path(), &files)).await.unwrap(), 1);
        let events = events(&buf);
        assert_eq!(events[1].1["err"]["message"], "Timeout of 100ms exceeded.");
    }

    #[tokio::test]
    async fn test_missing_test_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let files = [dir.path().join("gone.js")];
        let (mut runner, _buf) = runner(dir.path(), |_| {});

        assert!(runner.run(loaders(dir.path(), &files)).await.is_err());
    }
}
