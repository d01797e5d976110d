//! CLI tests for the worker binary.
//!
//! Spawns the built binary and verifies exit codes for valid,
//! structurally invalid, and runtime-failing contexts.

use std::fs;
use std::path::Path;
use std::process::Command;

use worker::exit_codes;

const VALID_CONTEXT: &str = r#"{
    "worker_id": 1,
    "pool_id": 2,
    "runner": "builtin:noop",
    "environment": { "name": "node" },
    "isolation": "process"
}"#;

fn write_context(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("context.json");
    fs::write(&path, contents).expect("write context");
    path
}

fn worker_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_worker"))
}

#[test]
fn validate_accepts_a_well_formed_context() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_context(temp.path(), VALID_CONTEXT);

    let output = worker_cmd()
        .arg("validate")
        .arg("--context")
        .arg(&path)
        .output()
        .expect("worker validate");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&output.stdout).contains("ok: worker 1 pool 2"));
}

#[test]
fn validate_rejects_a_context_missing_the_runner() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_context(
        temp.path(),
        r#"{"worker_id": 1, "pool_id": 2, "environment": {"name": "node"}}"#,
    );

    let output = worker_cmd()
        .arg("validate")
        .arg("--context")
        .arg(&path)
        .output()
        .expect("worker validate");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("schema validation failed"));
}

#[test]
fn validate_rejects_a_relative_runner_locator() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_context(
        temp.path(),
        r#"{
            "worker_id": 1,
            "pool_id": 2,
            "runner": "./runner.rs",
            "environment": { "name": "node" }
        }"#,
    );

    let output = worker_cmd()
        .arg("validate")
        .arg("--context")
        .arg(&path)
        .output()
        .expect("worker validate");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("cannot be relative"));
}

#[test]
fn run_rejects_a_missing_context_file() {
    let temp = tempfile::tempdir().expect("tempdir");

    let output = worker_cmd()
        .arg("run")
        .arg("--context")
        .arg(temp.path().join("absent.json"))
        .output()
        .expect("worker run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn run_fails_fast_when_the_controller_is_absent() {
    // `output()` wires stdin to null, so the noop runner's stdio channel
    // sees an immediately closed controller: environment resolution
    // fails, teardown still runs, and the binary exits FAILED instead of
    // hanging.
    let temp = tempfile::tempdir().expect("tempdir");
    let path = write_context(temp.path(), VALID_CONTEXT);

    let output = worker_cmd()
        .arg("run")
        .arg("--context")
        .arg(&path)
        .output()
        .expect("worker run");

    assert_eq!(output.status.code(), Some(exit_codes::FAILED));
    assert!(String::from_utf8_lossy(&output.stderr).contains("environment"));
}
