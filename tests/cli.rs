//! End-to-end tests for the bmocha binary.
//!
//! Each test runs in its own temporary working directory.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn bmocha(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bmocha").unwrap();
    cmd.current_dir(dir.path()).env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_version() {
    let dir = TempDir::new().unwrap();
    bmocha(&dir)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help() {
    let dir = TempDir::new().unwrap();
    bmocha(&dir)
        .arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: bmocha [options] [files]"));
}

#[test]
fn test_reporters() {
    let dir = TempDir::new().unwrap();
    bmocha(&dir)
        .arg("--reporters")
        .assert()
        .success()
        .stdout(predicate::str::contains("spec").and(predicate::str::contains("json-stream")));
}

#[test]
fn test_invalid_reporter() {
    let dir = TempDir::new().unwrap();
    bmocha(&dir)
        .args(["-R", "bogus"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid reporter: 'bogus'."));
}

#[test]
fn test_port_out_of_range() {
    let dir = TempDir::new().unwrap();
    bmocha(&dir)
        .args(["--port", "70000"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid port"));
}

#[test]
fn test_unknown_flag_is_not_a_file() {
    let dir = TempDir::new().unwrap();
    bmocha(&dir)
        .arg("--bogus")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid argument: --bogus."));
}

#[test]
fn test_missing_require_is_fatal() {
    let dir = TempDir::new().unwrap();
    bmocha(&dir)
        .args(["-r", "not-installed"])
        .assert()
        .code(1)
        .stderr(
            predicate::str::contains("An error occurred outside of the test suite:")
                .and(predicate::str::contains("Cannot find module 'not-installed'.")),
        );
}

#[test]
fn test_empty_run_passes() {
    let dir = TempDir::new().unwrap();
    bmocha(&dir)
        .arg("-C")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 passing"));
}

#[test]
fn test_json_reporter_with_no_files() {
    let dir = TempDir::new().unwrap();
    let output = bmocha(&dir).args(["-R", "json", "--exit"]).output().unwrap();

    assert!(output.status.success());
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["stats"]["tests"], 0);
    assert_eq!(report["tests"], serde_json::json!([]));
}

#[test]
fn test_invalid_defaults_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("bmocha.toml"), "reporter = \"bogus\"\n").unwrap();

    bmocha(&dir)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid reporter: 'bogus'."));

    bmocha(&dir).arg("--version").assert().success();
}

#[cfg(unix)]
#[test]
fn test_non_utf8_arguments() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let dir = TempDir::new().unwrap();

    bmocha(&dir)
        .args([OsStr::new("-C"), OsStr::from_bytes(b"missing-\xff.js")])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 passing"))
        .stderr(predicate::str::contains("Unhandled rejection").not());

    bmocha(&dir)
        .arg(OsStr::from_bytes(b"--\xff"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid argument:"));
}
