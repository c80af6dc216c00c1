//! Reporters: pluggable rendering of run progress and results

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use serde_json::{json, Value};

use crate::utils::format_duration;

/// Output format of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReporterKind {
    /// Human-readable list of results with a summary
    #[default]
    Spec,
    /// A single JSON document written when the run ends
    Json,
    /// One JSON event per line as the run progresses
    #[value(name = "json-stream")]
    JsonStream,
}

impl ReporterKind {
    /// Look up a reporter by its exact command-line name.
    pub fn from_name(name: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(name, false).ok()
    }

    pub fn name(self) -> &'static str {
        match self {
            ReporterKind::Spec => "spec",
            ReporterKind::Json => "json",
            ReporterKind::JsonStream => "json-stream",
        }
    }
}

/// A single reporter option value: `key=value` or a bare `key`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ReporterOption {
    Flag(bool),
    Text(String),
}

impl ReporterOption {
    pub fn as_flag(&self) -> bool {
        match self {
            ReporterOption::Flag(flag) => *flag,
            ReporterOption::Text(text) => !matches!(text.as_str(), "" | "0" | "false"),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ReporterOption::Text(text) => Some(text),
            ReporterOption::Flag(_) => None,
        }
    }
}

pub type ReporterOptions = BTreeMap<String, ReporterOption>;

/// How a single test file ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestOutcome {
    Passed,
    Failed(String),
}

/// Result of one test
#[derive(Debug, Clone)]
pub struct TestReport {
    pub title: String,
    pub file: PathBuf,
    pub duration: Duration,
    pub slow: bool,
    /// Zero-based index of the attempt that produced this result.
    pub retry: u32,
    pub outcome: TestOutcome,
    /// Captured child output (empty in console mode).
    pub output: String,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.outcome == TestOutcome::Passed
    }

    fn to_json(&self) -> Value {
        let err = match &self.outcome {
            TestOutcome::Passed => json!({}),
            TestOutcome::Failed(message) => json!({ "message": message, "output": self.output }),
        };

        json!({
            "title": self.title,
            "fullTitle": self.title,
            "file": self.file,
            "duration": self.duration.as_millis() as u64,
            "currentRetry": self.retry,
            "speed": if self.slow { "slow" } else { "fast" },
            "err": err,
        })
    }
}

/// Totals of a finished run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    pub tests: usize,
    pub passes: usize,
    pub failures: usize,
    pub duration: Duration,
}

impl RunStats {
    fn to_json(&self) -> Value {
        json!({
            "tests": self.tests,
            "passes": self.passes,
            "failures": self.failures,
            "pending": 0,
            "duration": self.duration.as_millis() as u64,
        })
    }
}

/// Receives run events from the engine
pub trait Reporter: Send {
    fn start(&mut self, total: usize) -> io::Result<()>;

    fn test_end(&mut self, report: &TestReport) -> io::Result<()>;

    fn end(&mut self, stats: &RunStats) -> io::Result<()>;
}

/// Build the reporter for `kind`.
///
/// The `output` option redirects JSON reporters to a file; everything else
/// writes to `out`.
pub fn create_reporter(
    kind: ReporterKind,
    options: &ReporterOptions,
    windows: bool,
    out: Box<dyn Write + Send>,
) -> io::Result<Box<dyn Reporter>> {
    Ok(match kind {
        ReporterKind::Spec => Box::new(SpecReporter::new(out, windows)),
        ReporterKind::Json => {
            let pretty = options.get("pretty").is_some_and(ReporterOption::as_flag);
            Box::new(JsonReporter::new(redirect(options, out)?, pretty))
        }
        ReporterKind::JsonStream => Box::new(JsonStreamReporter {
            out: redirect(options, out)?,
        }),
    })
}

fn redirect(
    options: &ReporterOptions,
    out: Box<dyn Write + Send>,
) -> io::Result<Box<dyn Write + Send>> {
    match options.get("output").and_then(ReporterOption::as_text) {
        Some(path) => Ok(Box::new(BufWriter::new(File::create(path)?))),
        None => Ok(out),
    }
}

/// Human-readable reporter
pub struct SpecReporter {
    out: Box<dyn Write + Send>,
    pass_symbol: &'static str,
    failures: Vec<TestReport>,
}

impl SpecReporter {
    pub fn new(out: Box<dyn Write + Send>, windows: bool) -> Self {
        Self {
            out,
            pass_symbol: if windows { "\u{221a}" } else { "\u{2713}" },
            failures: Vec::new(),
        }
    }
}

impl Reporter for SpecReporter {
    fn start(&mut self, _total: usize) -> io::Result<()> {
        writeln!(self.out)
    }

    fn test_end(&mut self, report: &TestReport) -> io::Result<()> {
        if report.passed() {
            write!(self.out, "  {} {}", self.pass_symbol.green(), report.title.dimmed())?;
            if report.slow {
                write!(self.out, " {}", format!("({})", format_duration(report.duration)).red())?;
            }
            writeln!(self.out)
        } else {
            self.failures.push(report.clone());
            writeln!(
                self.out,
                "  {}",
                format!("{}) {}", self.failures.len(), report.title).red()
            )
        }
    }

    fn end(&mut self, stats: &RunStats) -> io::Result<()> {
        writeln!(self.out)?;
        writeln!(
            self.out,
            "  {} {}",
            format!("{} passing", stats.passes).green(),
            format!("({})", format_duration(stats.duration)).dimmed()
        )?;

        if stats.failures > 0 {
            writeln!(self.out, "  {}", format!("{} failing", stats.failures).red())?;
        }

        for (index, failure) in self.failures.iter().enumerate() {
            writeln!(self.out)?;
            writeln!(self.out, "  {}) {}:", index + 1, failure.title)?;
            if let TestOutcome::Failed(message) = &failure.outcome {
                writeln!(self.out, "     {}", message.red())?;
            }
            for line in failure.output.lines() {
                writeln!(self.out, "     {}", line.dimmed())?;
            }
        }

        writeln!(self.out)?;
        self.out.flush()
    }
}

/// Writes one JSON document at the end of the run
pub struct JsonReporter {
    out: Box<dyn Write + Send>,
    pretty: bool,
    tests: Vec<Value>,
    passes: Vec<Value>,
    failures: Vec<Value>,
}

impl JsonReporter {
    pub fn new(out: Box<dyn Write + Send>, pretty: bool) -> Self {
        Self {
            out,
            pretty,
            tests: Vec::new(),
            passes: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl Reporter for JsonReporter {
    fn start(&mut self, _total: usize) -> io::Result<()> {
        Ok(())
    }

    fn test_end(&mut self, report: &TestReport) -> io::Result<()> {
        let value = report.to_json();
        if report.passed() {
            self.passes.push(value.clone());
        } else {
            self.failures.push(value.clone());
        }
        self.tests.push(value);
        Ok(())
    }

    fn end(&mut self, stats: &RunStats) -> io::Result<()> {
        let document = json!({
            "stats": stats.to_json(),
            "tests": self.tests,
            "passes": self.passes,
            "failures": self.failures,
        });

        if self.pretty {
            serde_json::to_writer_pretty(&mut self.out, &document)?;
        } else {
            serde_json::to_writer(&mut self.out, &document)?;
        }

        writeln!(self.out)?;
        self.out.flush()
    }
}

/// Writes `["event", {...}]` lines
pub struct JsonStreamReporter {
    out: Box<dyn Write + Send>,
}

impl JsonStreamReporter {
    fn emit(&mut self, event: &str, body: Value) -> io::Result<()> {
        serde_json::to_writer(&mut self.out, &json!([event, body]))?;
        writeln!(self.out)
    }
}

impl Reporter for JsonStreamReporter {
    fn start(&mut self, total: usize) -> io::Result<()> {
        self.emit("start", json!({ "total": total }))
    }

    fn test_end(&mut self, report: &TestReport) -> io::Result<()> {
        let event = if report.passed() { "pass" } else { "fail" };
        self.emit(event, report.to_json())
    }

    fn end(&mut self, stats: &RunStats) -> io::Result<()> {
        self.emit("end", stats.to_json())?;
        self.out.flush()
    }
}
