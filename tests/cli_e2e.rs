//! End-to-end CLI tests for the wishlist binary.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn wishlist() -> Command {
    let mut cmd = Command::cargo_bin("wishlist").unwrap();
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Test that --help displays usage information and exits with code 0.
#[test]
fn test_binary_help_displays_usage() {
    wishlist()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Resolve captured links"))
        .stdout(predicate::str::contains("reconcile"))
        .stdout(predicate::str::contains("ingest"));
}

/// Test that --version displays version and exits with code 0.
#[test]
fn test_binary_version_displays_version() {
    wishlist()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("wishlist"));
}

/// Test that invalid flags cause non-zero exit.
#[test]
fn test_binary_invalid_flag_returns_error() {
    wishlist()
        .arg("--invalid-flag")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_binary_concurrency_out_of_range_rejected() {
    wishlist()
        .args(["download", "-c", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("0"));
}

#[test]
fn test_binary_run_without_pending_store_fails() {
    let temp = TempDir::new().unwrap();
    wishlist()
        .arg("--work-dir")
        .arg(temp.path())
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_binary_reconcile_without_logs_is_noop() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("wishlist.txt"), "a1\n").unwrap();

    wishlist()
        .arg("--work-dir")
        .arg(temp.path())
        .arg("reconcile")
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to do"));

    assert_eq!(
        fs::read_to_string(temp.path().join("wishlist.txt")).unwrap(),
        "a1\n"
    );
}

#[test]
fn test_binary_ingest_merges_capture_files() {
    let temp = TempDir::new().unwrap();
    fs::write(
        temp.path().join("captured_urls_1.txt"),
        "[2025-01-01 10:00:00] https://wallhaven.cc/w/a1\n",
    )
    .unwrap();
    fs::write(
        temp.path().join("captured_urls_2.txt"),
        "[2025-01-01 10:00:00] https://wallhaven.cc/w/a1\n[2025-01-01 10:01:00] https://wallhaven.cc/w/b2\n",
    )
    .unwrap();

    wishlist()
        .arg("-w")
        .arg(temp.path())
        .arg("ingest")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 added"));

    let pending = fs::read_to_string(temp.path().join("wishlist.txt")).unwrap();
    assert_eq!(pending.lines().count(), 2);
    assert!(!temp.path().join("captured_urls_1.txt").exists());
    assert!(!temp.path().join("captured_urls_2.txt").exists());
}

#[test]
fn test_binary_ingest_retry_failures_requeues() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("fails.txt"), "b2\n").unwrap();

    wishlist()
        .arg("-w")
        .arg(temp.path())
        .args(["ingest", "--retry-failures"])
        .assert()
        .success()
        .stdout(predicate::str::contains("failure log re-queued"));

    assert_eq!(
        fs::read_to_string(temp.path().join("wishlist.txt")).unwrap(),
        "b2\n"
    );
    assert!(!temp.path().join("fails.txt").exists());
}

#[test]
fn test_binary_quiet_suppresses_summary() {
    let temp = TempDir::new().unwrap();
    wishlist()
        .arg("-q")
        .arg("-w")
        .arg(temp.path())
        .arg("reconcile")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_binary_invalid_config_file_fails() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("wishlist.toml"), "download_concurrency = 0\n").unwrap();

    wishlist()
        .arg("-w")
        .arg(temp.path())
        .arg("reconcile")
        .assert()
        .failure()
        .stderr(predicate::str::contains("download_concurrency"));
}
