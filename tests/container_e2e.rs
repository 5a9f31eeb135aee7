//! End-to-end container tests
//!
//! These build real images and start containers, so they need a Docker daemon
//! and network access for the base image and the dependency tool. Run with
//! `cargo test -- --ignored`.

mod support;

use serial_test::serial;
use std::process::{Command, Output};
use support::{copy_fixture, fixture_path, venvpack_bin};
use tempfile::TempDir;

fn venvpack(args: &[&str], context: Option<&std::path::Path>) -> Output {
    let mut command = Command::new(venvpack_bin());
    command.args(args);
    if let Some(path) = context {
        command.arg(path);
    }
    command.output().expect("Failed to execute venvpack")
}

fn build(fixture: &str, tag: &str) -> Output {
    venvpack(&["build", "-q", "--tag", tag], Some(&fixture_path(fixture)))
}

#[test]
#[ignore]
#[serial]
fn test_container_prints_ok_and_exits_zero() {
    let tag = "venvpack-e2e-ok:latest";
    let built = build("uv-empty", tag);
    assert!(
        built.status.success(),
        "build failed: {}",
        String::from_utf8_lossy(&built.stderr)
    );

    let run = venvpack(&["run", "-q", tag], None);
    assert_eq!(run.status.code(), Some(0));
    assert_eq!(String::from_utf8_lossy(&run.stdout).trim(), "ok");
}

#[test]
#[ignore]
#[serial]
fn test_missing_main_builds_but_exits_non_zero() {
    let tag = "venvpack-e2e-missing-main:latest";
    let built = build("missing-main", tag);
    assert!(
        built.status.success(),
        "build failed: {}",
        String::from_utf8_lossy(&built.stderr)
    );

    let run = venvpack(&["run", "-q", tag], None);
    assert_ne!(run.status.code(), Some(0));
    assert!(!String::from_utf8_lossy(&run.stdout).contains("ok"));
}

#[test]
#[ignore]
#[serial]
fn test_exit_code_and_env_are_forwarded() {
    let tag = "venvpack-e2e-env:latest";
    let built = build("requirements", tag);
    assert!(built.status.success());

    let run = venvpack(
        &["run", "-q", tag, "--env", "GREETING=hello", "--env", "EXIT_CODE=7"],
        None,
    );
    assert_eq!(run.status.code(), Some(7));
    assert_eq!(String::from_utf8_lossy(&run.stdout).trim(), "hello");
}

#[test]
#[ignore]
#[serial]
fn test_failed_dependency_install_names_stage() {
    let context = copy_fixture("requirements");
    std::fs::write(
        context.path().join("requirements.txt"),
        "this-package-does-not-exist-venvpack==0.0.0\n",
    )
    .unwrap();

    let built = venvpack(
        &["build", "--tag", "venvpack-e2e-broken:latest"],
        Some(context.path()),
    );
    assert_eq!(built.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&built.stderr);
    assert!(stderr.contains("Error [dependency-install]"), "stderr: {}", stderr);
}

#[test]
#[ignore]
#[serial]
fn test_local_execution_runs_in_workdir() {
    let root = TempDir::new().unwrap();
    let context = copy_fixture("requirements");
    std::fs::write(
        context.path().join("main.py"),
        "import os, shutil\nprint(os.getcwd())\nprint(shutil.which('python'))\n",
    )
    .unwrap();

    let mut command = Command::new(venvpack_bin());
    command
        .args(["local", "-q", "--root"])
        .arg(root.path())
        .arg(context.path());
    let first = command.output().expect("Failed to execute venvpack");
    assert!(
        first.status.success(),
        "local failed: {}",
        String::from_utf8_lossy(&first.stderr)
    );

    let stdout = String::from_utf8_lossy(&first.stdout);
    let mut lines = stdout.lines();
    let workdir = root.path().join("app");
    assert_eq!(lines.next().map(std::path::PathBuf::from), Some(workdir.clone()));
    assert_eq!(
        lines.next().map(std::path::PathBuf::from),
        Some(workdir.join(".venv/bin/python"))
    );

    // Unchanged manifest: the second run reuses the environment
    let second = command.output().expect("Failed to execute venvpack");
    assert!(second.status.success());
    assert!(workdir.join(".venv").join(venvpack::executor::STAMP_FILE).is_file());
}
