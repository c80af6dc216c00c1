//! Launch dispatch
//!
//! Chooses between running the discovered files locally through the engine
//! and serving them to a browser.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, error, info};
use url::Url;

use crate::browser::Launcher;
use crate::config::RunConfig;
use crate::engine::{Engine, EngineOptions, Loader};
use crate::error::LoadError;
use crate::resolver::{DiscoveredFiles, ModuleRegistry, ModuleResolver};
use crate::server::BrowserServer;

/// Loopback host the browser server binds to
pub const SERVER_HOST: &str = "127.0.0.1";

/// Port used in listen mode when none is given and no browser is opened
pub const DEFAULT_PORT: u16 = 8080;

/// Builds the browser server from engine options, test files and required modules
pub type ServerFactory =
    Box<dyn FnOnce(&EngineOptions, &[PathBuf], &[String]) -> Box<dyn BrowserServer> + Send>;

/// How the process should end once dispatch returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Terminate with this code
    Exit(i32),
    /// A server is listening; stay alive
    KeepAlive,
}

/// Drives the engine or the browser server for one invocation
pub struct Dispatcher {
    cwd: PathBuf,
    engine: Box<dyn Engine>,
    server_factory: ServerFactory,
    launcher: Box<dyn Launcher>,
}

impl Dispatcher {
    pub fn new(
        cwd: impl Into<PathBuf>,
        engine: Box<dyn Engine>,
        server_factory: ServerFactory,
        launcher: Box<dyn Launcher>,
    ) -> Self {
        Self {
            cwd: cwd.into(),
            engine,
            server_factory,
            launcher,
        }
    }

    pub async fn dispatch(
        mut self,
        config: &RunConfig,
        files: DiscoveredFiles,
    ) -> Result<DispatchOutcome> {
        *self.engine.options_mut() = EngineOptions::from_config(config);

        if config.listen {
            self.serve(config, files).await
        } else {
            self.run_local(config, files).await
        }
    }

    async fn serve(self, config: &RunConfig, files: DiscoveredFiles) -> Result<DispatchOutcome> {
        let port = resolve_port(config);
        let mut server = (self.server_factory)(self.engine.options(), &files, &config.requires);

        let addr = server.listen(port, SERVER_HOST).await?;
        let url = display_url(addr.port())?;

        let mut errors = server.errors();
        tokio::spawn(async move {
            while let Ok(err) = errors.recv().await {
                error!("Server error: {}", err);
            }
        });

        eprintln!("Listening on: {}", url);
        info!("Serving {} test file(s) on port {}", files.len(), addr.port());

        if config.open {
            self.launcher.open(url.as_str(), config.command.as_deref());
        }

        Ok(DispatchOutcome::KeepAlive)
    }

    async fn run_local(
        mut self,
        config: &RunConfig,
        files: DiscoveredFiles,
    ) -> Result<DispatchOutcome> {
        let resolver = ModuleResolver::for_directory(&self.cwd);
        let registry = Arc::new(Mutex::new(ModuleRegistry::new(resolver)));

        for request in &config.requires {
            let module = registry
                .lock()
                .require(request)
                .with_context(|| format!("Failed to load required module '{}'", request))?;
            debug!("Loaded required module {}", module.path.display());
            self.engine.options_mut().preloads.push(module.path.clone());
        }

        let loaders: Vec<Loader> = files
            .into_iter()
            .map(|path| test_loader(registry.clone(), path))
            .collect();

        self.engine
            .configure_reporting(config.reporter, &config.reporter_options)?;

        let code = self.engine.run(loaders).await?;

        Ok(DispatchOutcome::Exit(code))
    }
}

/// Port to listen on: the explicit one, else ephemeral when a browser will be
/// opened, else [`DEFAULT_PORT`].
pub fn resolve_port(config: &RunConfig) -> u16 {
    match config.port {
        Some(port) => port,
        None if config.open => 0,
        None => DEFAULT_PORT,
    }
}

fn display_url(port: u16) -> Result<Url> {
    Url::parse(&format!("http://localhost:{}/", port)).context("Failed to build server URL")
}

/// Wrap a test file into a loader that reloads it fresh on every call.
fn test_loader(registry: Arc<Mutex<ModuleRegistry>>, path: PathBuf) -> Loader {
    Box::new(move || {
        let mut registry = registry.lock();
        registry.invalidate(&path);
        registry.load(&path).map_err(|err| rename_missing(err, &path))
    })
}

fn rename_missing(err: LoadError, path: &Path) -> LoadError {
    match err {
        LoadError::ModuleNotFound(_) => LoadError::TestFileNotFound(path.to_path_buf()),
        other => other,
    }
}
