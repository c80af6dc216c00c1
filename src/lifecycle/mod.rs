//! Process lifecycle
//!
//! Parsing, then resolving, then dispatching; every path ends in exactly
//! one [`Termination`].

use std::ffi::OsStr;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Once;

use anyhow::Result;
use tracing::debug;

use crate::cli::{help_text, reporters_text, version_text, ConfigBuilder, Parsed};
use crate::config;
use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::ParseError;
use crate::resolver::FileResolver;

static REJECTION_HOOK: Once = Once::new();

/// How the process ends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Exit with `code`; `immediate` exits without shutting the runtime down.
    Exit { code: u8, immediate: bool },
    /// Stay alive while the server listens.
    KeepAlive,
}

impl Termination {
    fn exit(code: u8) -> Self {
        Termination::Exit {
            code,
            immediate: false,
        }
    }

    fn fatal() -> Self {
        Termination::Exit {
            code: 1,
            immediate: true,
        }
    }
}

/// Install the process-wide handler for panics that escape everything else,
/// including those inside spawned tasks. Installing more than once is a no-op.
pub fn install_rejection_hook() {
    REJECTION_HOOK.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let backtrace = std::backtrace::Backtrace::force_capture();
            eprint!("{}", rejection_report(info, &backtrace));
            std::process::exit(1);
        }));
    });
}

/// Diagnostic printed for a panic that reached the process-wide hook.
pub fn rejection_report(panic: &dyn Display, backtrace: &dyn Display) -> String {
    format!("Unhandled rejection:\n{}\n{}\n", panic, backtrace)
}

/// Map an engine result onto the OS exit-code range.
///
/// Negative results are failures and become 1.
pub fn exit_code(code: i32) -> u8 {
    if code < 0 {
        1
    } else {
        u8::try_from(code).unwrap_or(u8::MAX)
    }
}

pub struct Lifecycle {
    cwd: PathBuf,
    dispatcher: Dispatcher,
}

impl Lifecycle {
    pub fn new(cwd: impl Into<PathBuf>, dispatcher: Dispatcher) -> Self {
        Self {
            cwd: cwd.into(),
            dispatcher,
        }
    }

    /// Run one invocation with `args` (program name excluded).
    pub async fn run<S: AsRef<OsStr>>(self, args: &[S]) -> Termination {
        match self.execute(args).await {
            Ok(termination) => termination,
            Err(err) => {
                eprintln!("An error occurred outside of the test suite:");
                eprintln!("{:?}", err);
                Termination::fatal()
            }
        }
    }

    async fn execute<S: AsRef<OsStr>>(self, args: &[S]) -> Result<Termination> {
        debug!("Parsing arguments");

        let defaults = config::load_defaults(&self.cwd);
        let parsed = match ConfigBuilder::new(&self.cwd).with_defaults(defaults).parse(args) {
            Ok(parsed) => parsed,
            Err(err @ ParseError::Filesystem { .. }) => return Err(err.into()),
            Err(err) => {
                eprintln!("{}", err);
                return Ok(Termination::exit(1));
            }
        };

        let config = match parsed {
            Parsed::Run(config) => config,
            Parsed::Version => {
                println!("{}", version_text());
                return Ok(Termination::exit(0));
            }
            Parsed::Help => {
                println!("{}", help_text());
                return Ok(Termination::exit(0));
            }
            Parsed::Reporters => {
                println!("{}", reporters_text());
                return Ok(Termination::exit(0));
            }
        };

        debug!("Resolving test files");

        let files = FileResolver::from_config(&self.cwd, &config)
            .resolve(&config.files, &config.file_flags)?;

        debug!("Dispatching {} test file(s)", files.len());

        let termination = match self.dispatcher.dispatch(&config, files).await? {
            DispatchOutcome::Exit(code) => Termination::Exit {
                code: exit_code(code),
                immediate: config.exit,
            },
            DispatchOutcome::KeepAlive => Termination::KeepAlive,
        };

        Ok(termination)
    }
}
