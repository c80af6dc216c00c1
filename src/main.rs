//! bmocha - run JavaScript test files locally or serve them to a browser

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use bmocha_lib::browser::SystemBrowser;
use bmocha_lib::dispatch::Dispatcher;
use bmocha_lib::engine::{EngineOptions, NodeRunner};
use bmocha_lib::lifecycle::{self, Lifecycle, Termination};
use bmocha_lib::server::{BrowserServer, DevServer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the logging/tracing system
fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bmocha=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    lifecycle::install_rejection_hook();
    init_tracing();

    let cwd = match std::env::current_dir() {
        Ok(cwd) => cwd,
        Err(err) => {
            eprintln!("An error occurred outside of the test suite:");
            let err = anyhow::Error::new(err).context("Failed to read the working directory");
            eprintln!("{:?}", err);
            std::process::exit(1);
        }
    };

    let server_cwd = cwd.clone();
    let dispatcher = Dispatcher::new(
        &cwd,
        Box::new(NodeRunner::new(&cwd)),
        Box::new(move |options: &EngineOptions, files: &[PathBuf], requires: &[String]| {
            let server = DevServer::new(options, files, requires, &server_cwd);
            Box::new(server) as Box<dyn BrowserServer>
        }),
        Box::new(SystemBrowser),
    );

    let args: Vec<OsString> = std::env::args_os().skip(1).collect();

    match Lifecycle::new(&cwd, dispatcher).run(&args).await {
        Termination::Exit { code, immediate: true } => std::process::exit(i32::from(code)),
        Termination::Exit { code, immediate: false } => ExitCode::from(code),
        Termination::KeepAlive => std::future::pending().await,
    }
}
