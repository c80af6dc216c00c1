//! bmocha library
//!
//! Command-line orchestration for running JavaScript test files: argument
//! parsing, test file discovery, local runs through an engine, and serving
//! tests to a browser.

pub mod browser;
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod resolver;
pub mod server;
pub mod utils;

pub use config::RunConfig;
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use lifecycle::{Lifecycle, Termination};
