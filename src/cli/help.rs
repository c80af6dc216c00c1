//! Informational output

use clap::ValueEnum;

use crate::engine::ReporterKind;

const USAGE: &str = "
  Usage: bmocha [options] [files]

  Options:

    -V, --version             output the version number
    -c, --colors              force enabling of colors
    -C, --no-colors           force disabling of colors
    -O, --reporter-options    reporter-specific options (<k=v,k2=v2,...>)
    -R, --reporter <name>     specify the reporter to use (default: spec)
    -S, --sort                sort test files
    -b, --bail                bail after first test failure
    -g, --grep <pattern>      only run tests matching <pattern>
    -f, --fgrep <string>      only run tests containing <string>
    -i, --invert              inverts --grep and --fgrep matches
    -r, --require <name>      require the given module
    -s, --slow <ms>           \"slow\" test threshold in milliseconds (default: 75)
    -t, --timeout <ms>        set test-case timeout in milliseconds (default: 2000)
    --no-timeouts             disables timeouts
    --exit                    force shutdown of the event loop after test run
    --recursive               include sub directories
    --reporters               display available reporters
    --retries <times>         set numbers of time to retry a failed test case
    --file <file>             include a file to be ran during the suite
    --exclude <file>          a file to ignore
    -l, --listen              serve tests in the browser
    -p, --port <port>         port to listen on
    -o, --open                open browser after serving
    -m, --cmd <cmd>           command to open browser with
    -z, --console             use console in browser
    -h, --help                output usage information
";

pub fn version_text() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub fn help_text() -> &'static str {
    USAGE
}

/// One line per reporter with its description
pub fn reporters_text() -> String {
    let mut out = String::from("\n");

    for kind in ReporterKind::value_variants() {
        if let Some(value) = kind.to_possible_value() {
            let help = value.get_help().map(ToString::to_string).unwrap_or_default();
            out.push_str(&format!("    {:<12} - {}\n", value.get_name(), help));
        }
    }

    out
}
