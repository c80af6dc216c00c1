//! Browser launching
//!
//! Opening a browser is fire-and-forget: the child is spawned detached and
//! never waited on. Whether it starts, or what it does afterwards, is not
//! observable by the caller.

use std::process::{Command, Stdio};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

/// Browser names that understand `--app=<url>`
static CHROME_FAMILY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)chrom(e|ium)").unwrap());

/// Host platform family, as far as opening URLs is concerned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Unix,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(windows) {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Unix
        }
    }
}

/// A program and its arguments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
        }
    }
}

/// Decide how to open `url`.
///
/// An explicit command wins: with a `%s` placeholder it runs through the
/// shell, otherwise the URL is its only argument. Without one, the platform
/// opener is used; on generic Unix `browser` (from `$BROWSER`) overrides
/// `xdg-open`.
pub fn invocation(
    url: &str,
    command: Option<&str>,
    platform: Platform,
    browser: Option<&str>,
) -> Invocation {
    if let Some(command) = command {
        if command.contains("%s") {
            let line = command.replacen("%s", url, 1);
            return match platform {
                Platform::Windows => Invocation::new("cmd", &["/C", &line]),
                _ => Invocation::new("sh", &["-c", &line]),
            };
        }
        return Invocation::new(command, &[url]);
    }

    match platform {
        Platform::Windows => Invocation::new("cmd", &["/C", "start", "", url]),
        Platform::MacOs => Invocation::new("open", &[url]),
        Platform::Unix => match browser.filter(|name| !name.is_empty()) {
            None => Invocation::new("xdg-open", &[url]),
            Some(name) if CHROME_FAMILY.is_match(name) => {
                Invocation::new(name, &[&format!("--app={}", url)])
            }
            Some(name) => Invocation::new(name, &[url]),
        },
    }
}

/// Opens URLs in a browser
pub trait Launcher: Send + Sync {
    /// Start opening `url`. Never blocks and never reports failure.
    fn open(&self, url: &str, command: Option<&str>);
}

/// Launches the system browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl Launcher for SystemBrowser {
    fn open(&self, url: &str, command: Option<&str>) {
        let browser = std::env::var("BROWSER").ok();
        let invocation = invocation(url, command, Platform::current(), browser.as_deref());

        debug!("Opening browser: {:?}", invocation);

        let mut child = Command::new(&invocation.program);
        child
            .args(&invocation.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            child.process_group(0);
        }

        // The handle is dropped right away; the child outlives it.
        if let Err(e) = child.spawn() {
            debug!("Failed to open browser: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://localhost:4000/";

    #[test]
    fn test_command_with_placeholder_uses_shell() {
        let inv = invocation(URL, Some("firefox -new-tab %s"), Platform::Unix, None);
        assert_eq!(inv, Invocation::new("sh", &["-c", "firefox -new-tab http://localhost:4000/"]));

        let inv = invocation(URL, Some("start %s"), Platform::Windows, None);
        assert_eq!(inv, Invocation::new("cmd", &["/C", "start http://localhost:4000/"]));
    }

    #[test]
    fn test_only_first_placeholder_is_replaced() {
        let inv = invocation(URL, Some("echo %s %s"), Platform::Unix, None);
        assert_eq!(inv, Invocation::new("sh", &["-c", "echo http://localhost:4000/ %s"]));
    }

    #[test]
    fn test_command_without_placeholder_gets_url_argument() {
        let inv = invocation(URL, Some("firefox"), Platform::MacOs, Some("chromium"));
        assert_eq!(inv, Invocation::new("firefox", &[URL]));
    }

    #[test]
    fn test_platform_defaults() {
        assert_eq!(
            invocation(URL, None, Platform::Windows, None),
            Invocation::new("cmd", &["/C", "start", "", URL])
        );
        assert_eq!(invocation(URL, None, Platform::MacOs, None), Invocation::new("open", &[URL]));
        assert_eq!(
            invocation(URL, None, Platform::Unix, None),
            Invocation::new("xdg-open", &[URL])
        );
    }

    #[test]
    fn test_browser_override_on_unix() {
        assert_eq!(
            invocation(URL, None, Platform::Unix, Some("google-chrome")),
            Invocation::new("google-chrome", &["--app=http://localhost:4000/"])
        );
        assert_eq!(
            invocation(URL, None, Platform::Unix, Some("Chromium-Browser")),
            Invocation::new("Chromium-Browser", &["--app=http://localhost:4000/"])
        );
        assert_eq!(
            invocation(URL, None, Platform::Unix, Some("firefox")),
            Invocation::new("firefox", &[URL])
        );
    }
}
