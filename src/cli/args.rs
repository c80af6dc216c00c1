//! Command-line token scanner
//!
//! Tokens are scanned left to right with one token of lookahead for flags
//! that take a value. All usage errors are detected here.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::debug;

use super::Parsed;
use crate::config::{FileDefaults, RunConfig, DEFAULTS_FILE};
use crate::engine::{ReporterKind, ReporterOption, ReporterOptions};
use crate::error::{ConfigError, ParseError, UsageError};
use crate::utils;

/// What scanning a single token did
enum Scan {
    /// The token stood alone
    Next,
    /// The token consumed the following one as its value
    Consumed,
    /// An informational flag ends the scan
    Stop(Parsed),
}

/// Builds a [`RunConfig`] from defaults and the command line
pub struct ConfigBuilder {
    cwd: PathBuf,
    config: RunConfig,
    /// Defaults-file problem, raised only once a run is actually requested
    deferred: Option<ParseError>,
}

impl ConfigBuilder {
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: cwd.into(),
            config: RunConfig::default(),
            deferred: None,
        }
    }

    /// Apply the result of loading `bmocha.toml`.
    ///
    /// Errors are held back so informational flags still succeed.
    pub fn with_defaults(mut self, loaded: Result<Option<FileDefaults>, ConfigError>) -> Self {
        match loaded {
            Ok(Some(defaults)) => {
                if let Err(err) = self.apply_defaults(defaults) {
                    self.deferred = Some(err);
                }
            }
            Ok(None) => {}
            Err(err) => self.deferred = Some(err.into()),
        }
        self
    }

    fn apply_defaults(&mut self, defaults: FileDefaults) -> Result<(), ParseError> {
        let path = self.cwd.join(DEFAULTS_FILE);
        let invalid = |source: UsageError| ConfigError::Value {
            path: path.clone(),
            source,
        };

        if let Some(name) = defaults.reporter {
            self.config.reporter = parse_reporter(&name).map_err(invalid)?;
        }
        if let Some(list) = defaults.reporter_options {
            let options = parse_reporter_options(&list).map_err(invalid)?;
            self.config.reporter_options.extend(options);
        }

        let config = &mut self.config;
        config.colors = defaults.colors.or(config.colors);
        config.bail = defaults.bail.unwrap_or(config.bail);
        config.slow = defaults.slow.unwrap_or(config.slow);
        config.timeout = defaults.timeout.unwrap_or(config.timeout);
        config.timeouts = defaults.timeouts.unwrap_or(config.timeouts);
        config.retries = defaults.retries.unwrap_or(config.retries);
        config.sort = defaults.sort.unwrap_or(config.sort);
        config.recursive = defaults.recursive.unwrap_or(config.recursive);
        config.exit = defaults.exit.unwrap_or(config.exit);
        config.console = defaults.console.unwrap_or(config.console);
        if defaults.browser_command.is_some() {
            config.command = defaults.browser_command;
        }
        config.excludes.extend(defaults.exclude);

        for file in &defaults.file {
            let file = utils::absolutize(&self.cwd, file);
            self.config.file_flags.push(file);
        }

        for name in &defaults.require {
            let resolved = self.resolve_require(name)?;
            self.config.requires.push(resolved);
        }

        Ok(())
    }

    /// Scan the arguments (program name excluded).
    ///
    /// Paths need not be valid UTF-8; flags and their other values must be.
    pub fn parse<S: AsRef<OsStr>>(mut self, args: &[S]) -> Result<Parsed, ParseError> {
        let args: Vec<&OsStr> = args.iter().map(AsRef::as_ref).collect();
        let mut index = 0;

        while index < args.len() {
            let next = args.get(index + 1).copied();
            let scanned = match args[index].to_str() {
                Some(arg) => self.scan(arg, next)?,
                None => self.scan_path(args[index])?,
            };
            match scanned {
                Scan::Next => index += 1,
                Scan::Consumed => index += 2,
                Scan::Stop(parsed) => return Ok(parsed),
            }
        }

        if let Some(err) = self.deferred {
            return Err(err);
        }

        debug!("Parsed {} file argument(s)", self.config.files.len());

        Ok(Parsed::Run(Box::new(self.config)))
    }

    fn scan(&mut self, arg: &str, next: Option<&OsStr>) -> Result<Scan, ParseError> {
        let config = &mut self.config;

        match arg {
            "-V" | "--version" => return Ok(Scan::Stop(Parsed::Version)),
            "-h" | "--help" => return Ok(Scan::Stop(Parsed::Help)),
            "--reporters" => return Ok(Scan::Stop(Parsed::Reporters)),
            "-c" | "--colors" => config.colors = Some(true),
            "-C" | "--no-colors" => config.colors = Some(false),
            "-O" | "--reporter-options" => {
                let options = parse_reporter_options(value(arg, next)?)?;
                config.reporter_options.extend(options);
                return Ok(Scan::Consumed);
            }
            "-R" | "--reporter" => {
                config.reporter = parse_reporter(value(arg, next)?)?;
                return Ok(Scan::Consumed);
            }
            "-S" | "--sort" => config.sort = true,
            "-b" | "--bail" => config.bail = true,
            "-g" | "--grep" => {
                let pattern = Regex::new(value(arg, next)?).map_err(|_| UsageError::InvalidPattern {
                    flag: arg.to_string(),
                })?;
                config.grep = Some(pattern);
                return Ok(Scan::Consumed);
            }
            "-f" | "--fgrep" => {
                config.fgrep = Some(value(arg, next)?.to_string());
                return Ok(Scan::Consumed);
            }
            "-i" | "--invert" => config.invert = true,
            "-r" | "--require" => {
                let resolved = self.resolve_require(value(arg, next)?)?;
                self.config.requires.push(resolved);
                return Ok(Scan::Consumed);
            }
            "-s" | "--slow" => {
                config.slow = utils::to_uint32(value(arg, next)?);
                return Ok(Scan::Consumed);
            }
            "-t" | "--timeout" => {
                config.timeout = utils::to_uint32(value(arg, next)?);
                return Ok(Scan::Consumed);
            }
            "--no-timeouts" => config.timeouts = false,
            "--exit" => config.exit = true,
            "--recursive" => config.recursive = true,
            "--retries" => {
                config.retries = utils::to_uint32(value(arg, next)?);
                return Ok(Scan::Consumed);
            }
            "--file" => {
                let file = utils::absolutize(&self.cwd, path_value(arg, next)?);
                self.config.file_flags.push(file);
                return Ok(Scan::Consumed);
            }
            "--exclude" => {
                config.excludes.insert(value(arg, next)?.to_string());
                return Ok(Scan::Consumed);
            }
            "-l" | "--listen" => config.listen = true,
            "-p" | "--port" => {
                let raw = value(arg, next)?;
                let port = u16::try_from(utils::to_uint32(raw))
                    .map_err(|_| UsageError::InvalidPort(raw.to_string()))?;
                config.port = Some(port);
                config.listen = true;
                return Ok(Scan::Consumed);
            }
            "-o" | "--open" => {
                config.open = true;
                config.listen = true;
            }
            "-m" | "--cmd" => {
                config.command = Some(value(arg, next)?.to_string());
                config.open = true;
                config.listen = true;
                return Ok(Scan::Consumed);
            }
            "-z" | "--console" => config.console = true,
            _ if arg.starts_with('-') => {
                return Err(UsageError::UnknownArgument(arg.to_string()).into());
            }
            _ => config.files.push(PathBuf::from(arg)),
        }

        Ok(Scan::Next)
    }

    /// A token that is not valid UTF-8 can only be a path.
    fn scan_path(&mut self, arg: &OsStr) -> Result<Scan, ParseError> {
        let lossy = arg.to_string_lossy();
        if lossy.starts_with('-') {
            return Err(UsageError::UnknownArgument(lossy.into_owned()).into());
        }

        self.config.files.push(PathBuf::from(arg));
        Ok(Scan::Next)
    }

    /// Resolve `name` against the working directory if it (or `name.js`)
    /// exists there; otherwise keep the bare name for module search.
    fn resolve_require(&self, name: &str) -> Result<String, ParseError> {
        let path = utils::absolutize(&self.cwd, name);

        let mut with_js = OsString::from(path.as_os_str());
        with_js.push(".js");
        let with_js = PathBuf::from(with_js);

        for candidate in [&path, &with_js] {
            if exists_at(candidate)? {
                return Ok(candidate.display().to_string());
            }
        }

        Ok(name.to_string())
    }
}

fn exists_at(path: &Path) -> Result<bool, ParseError> {
    utils::exists(path).map_err(|source| ParseError::Filesystem {
        path: path.to_path_buf(),
        source,
    })
}

fn value<'a>(flag: &str, next: Option<&'a OsStr>) -> Result<&'a str, UsageError> {
    match next.map(OsStr::to_str) {
        Some(Some(value)) if !value.is_empty() => Ok(value),
        _ => Err(UsageError::MissingValue(flag.to_string())),
    }
}

fn path_value<'a>(flag: &str, next: Option<&'a OsStr>) -> Result<&'a OsStr, UsageError> {
    match next {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(UsageError::MissingValue(flag.to_string())),
    }
}

fn parse_reporter(name: &str) -> Result<ReporterKind, UsageError> {
    ReporterKind::from_name(name).ok_or_else(|| UsageError::InvalidReporter(name.to_string()))
}

/// Parse `key=value,flag,...` into reporter options.
///
/// Empty entries (`a,,b`, a trailing comma) are skipped.
pub fn parse_reporter_options(list: &str) -> Result<ReporterOptions, UsageError> {
    let mut options = ReporterOptions::new();

    for token in list.split(',').filter(|token| !token.is_empty()) {
        let parts: Vec<&str> = token.split('=').collect();
        match parts.as_slice() {
            [key] => {
                options.insert(key.to_string(), ReporterOption::Flag(true));
            }
            [key, value] => {
                options.insert(key.to_string(), ReporterOption::Text(value.to_string()));
            }
            _ => return Err(UsageError::InvalidReporterOption(token.to_string())),
        }
    }

    Ok(options)
}
