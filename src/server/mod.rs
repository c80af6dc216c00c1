//! Browser test server
//!
//! Serves a page that loads every required module and then every test file,
//! in order, for a client-side engine to run. Provides:
//! - The test page with engine options embedded as JSON
//! - Script routes for required modules and test files
//! - WebSocket live reload when a test file changes

mod reload;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use notify::RecursiveMode;
use notify_debouncer_mini::new_debouncer;
use serde::Serialize;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info};

use crate::engine::EngineOptions;
use crate::error::ServerError;
use crate::resolver::ModuleResolver;
use crate::utils;

pub use reload::ReloadMessage;

/// A server that hands tests to a browser
#[async_trait]
pub trait BrowserServer: Send {
    /// Bind and start serving; returns the bound address.
    async fn listen(&mut self, port: u16, host: &str) -> Result<SocketAddr>;

    /// Errors raised while serving. They never stop the server.
    fn errors(&mut self) -> broadcast::Receiver<ServerError>;
}

/// Shared server state
pub(crate) struct ServerState {
    /// Rendered test page
    page: String,

    /// Test files, in run order
    files: Vec<PathBuf>,

    /// Required modules, in load order
    requires: Vec<String>,

    resolver: ModuleResolver,

    reload_tx: broadcast::Sender<ReloadMessage>,
}

/// Engine options the page passes to the client-side engine
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientOptions<'a> {
    colors: Option<bool>,
    bail: bool,
    grep: Option<&'a str>,
    fgrep: Option<&'a str>,
    invert: bool,
    slow: u32,
    timeout: u32,
    timeouts: bool,
    retries: u32,
    console: bool,
}

impl<'a> From<&'a EngineOptions> for ClientOptions<'a> {
    fn from(options: &'a EngineOptions) -> Self {
        Self {
            colors: options.colors,
            bail: options.bail,
            grep: options.grep.as_ref().map(|re| re.as_str()),
            fgrep: options.fgrep.as_deref(),
            invert: options.invert,
            slow: options.slow,
            timeout: options.timeout,
            timeouts: options.timeouts,
            retries: options.retries,
            console: options.console,
        }
    }
}

/// Default browser server
pub struct DevServer {
    state: Arc<ServerState>,

    errors_tx: broadcast::Sender<ServerError>,

    /// Receiver held from construction so early errors are not lost
    first_errors_rx: Option<broadcast::Receiver<ServerError>>,

    cwd: PathBuf,

    watch: bool,
}

impl DevServer {
    pub fn new(
        options: &EngineOptions,
        files: &[PathBuf],
        requires: &[String],
        cwd: &Path,
    ) -> Self {
        let (reload_tx, _) = broadcast::channel::<ReloadMessage>(16);
        let (errors_tx, first_errors_rx) = broadcast::channel::<ServerError>(64);

        let state = Arc::new(ServerState {
            page: render_page(&ClientOptions::from(options), files.len(), requires.len(), true),
            files: files.to_vec(),
            requires: requires.to_vec(),
            resolver: ModuleResolver::for_directory(cwd),
            reload_tx,
        });

        Self {
            state,
            errors_tx,
            first_errors_rx: Some(first_errors_rx),
            cwd: cwd.to_path_buf(),
            watch: true,
        }
    }

    /// Turn file watching on or off (on by default)
    pub fn watch(mut self, watch: bool) -> Self {
        self.watch = watch;
        self
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/", get(serve_index))
            .route("/__bmocha/require/:index", get(serve_require))
            .route("/__bmocha/test/:index", get(serve_test))
            .route("/__bmocha/reload", get(reload::reload_websocket))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Watch the test files and push a reload when one changes
    fn setup_file_watcher(&self) -> Result<()> {
        let (tx, rx) = std::sync::mpsc::channel();

        let mut debouncer = new_debouncer(std::time::Duration::from_millis(100), tx)?;

        for file in &self.state.files {
            debouncer
                .watcher()
                .watch(file, RecursiveMode::NonRecursive)
                .with_context(|| format!("Failed to watch {}", file.display()))?;
        }

        let reload_tx = self.state.reload_tx.clone();
        let errors_tx = self.errors_tx.clone();
        let cwd = self.cwd.clone();

        // The debouncer lives as long as this thread.
        std::thread::spawn(move || {
            let _debouncer = debouncer;

            loop {
                match rx.recv() {
                    Ok(Ok(events)) => {
                        for event in events {
                            let reason =
                                format!("File changed: {}", utils::display_path(&cwd, &event.path));
                            debug!("{}", reason);
                            let _ = reload_tx.send(ReloadMessage::FullReload { reason });
                        }
                    }
                    Ok(Err(e)) => {
                        let _ = errors_tx.send(ServerError::new(format!("Watch error: {:?}", e)));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(())
    }
}

#[async_trait]
impl BrowserServer for DevServer {
    async fn listen(&mut self, port: u16, host: &str) -> Result<SocketAddr> {
        let listener = tokio::net::TcpListener::bind((host, port))
            .await
            .with_context(|| format!("Failed to listen on {}:{}", host, port))?;
        let addr = listener.local_addr()?;

        if self.watch && !self.state.files.is_empty() {
            if let Err(e) = self.setup_file_watcher() {
                let _ = self.errors_tx.send(ServerError::new(format!("{:#}", e)));
            }
        }

        let app = self.router();
        let errors_tx = self.errors_tx.clone();

        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                let _ = errors_tx.send(ServerError::new(e));
            }
        });

        info!("Server listening on http://{}", addr);

        Ok(addr)
    }

    fn errors(&mut self) -> broadcast::Receiver<ServerError> {
        self.first_errors_rx
            .take()
            .unwrap_or_else(|| self.errors_tx.subscribe())
    }
}

/// Serve the test page
async fn serve_index(State(state): State<Arc<ServerState>>) -> Response {
    Html(state.page.clone()).into_response()
}

/// Serve a required module by position
async fn serve_require(
    State(state): State<Arc<ServerState>>,
    axum::extract::Path(index): axum::extract::Path<usize>,
) -> Response {
    let Some(name) = state.requires.get(index) else {
        return (StatusCode::NOT_FOUND, format!("No required module #{}", index)).into_response();
    };

    match state.resolver.resolve(name) {
        Ok(path) => serve_script(&path).await,
        Err(e) => {
            error!("{}", e);
            (StatusCode::NOT_FOUND, e.to_string()).into_response()
        }
    }
}

/// Serve a test file by position
async fn serve_test(
    State(state): State<Arc<ServerState>>,
    axum::extract::Path(index): axum::extract::Path<usize>,
) -> Response {
    match state.files.get(index) {
        Some(path) => serve_script(path).await,
        None => (StatusCode::NOT_FOUND, format!("No test file #{}", index)).into_response(),
    }
}

async fn serve_script(path: &Path) -> Response {
    match tokio::fs::read(path).await {
        Ok(content) => (
            [(header::CONTENT_TYPE, "application/javascript; charset=utf-8")],
            content,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to read {}: {}", path.display(), e);
            (StatusCode::NOT_FOUND, format!("Failed to read {}", path.display())).into_response()
        }
    }
}

/// Render the test page: options, then required modules, then test files
fn render_page(options: &ClientOptions<'_>, files: usize, requires: usize, reload: bool) -> String {
    let options = serde_json::to_string(options)
        .unwrap_or_else(|_| "{}".to_string())
        .replace("</", "<\\/");

    let mut scripts = String::new();
    for index in 0..requires {
        scripts.push_str(&format!("    <script src=\"/__bmocha/require/{}\"></script>\n", index));
    }
    for index in 0..files {
        scripts.push_str(&format!("    <script src=\"/__bmocha/test/{}\"></script>\n", index));
    }

    let reload_script = if reload { reload::CLIENT_SCRIPT } else { "" };

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <title>bmocha</title>
  </head>
  <body>
    <div id="bmocha"></div>
    <script>window.__bmocha = {};</script>
{}    {}
  </body>
</html>
"#,
        options, scripts, reload_script
    )
}
