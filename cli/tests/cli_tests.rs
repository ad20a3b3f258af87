//! Integration tests for the proxyfleet binary
//!
//! These tests exercise argument parsing and the offline code paths; nothing
//! here talks to a cloud provider.

#![allow(clippy::expect_used, deprecated)]

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const ENV_VARS: &[&str] = &[
    "DIGITALOCEAN_ACCESS_TOKEN",
    "PROXYFLEET_COUNT",
    "PROXYFLEET_REGIONS",
    "PROXYFLEET_IMAGE",
    "PROXYFLEET_SIZE",
    "PROXYFLEET_SSH_KEY",
    "PROXYFLEET_RECORD_LOG",
    "PROXYFLEET_LAUNCHER",
    "NO_COLOR",
];

/// Binary with a clean environment and a config path inside `dir`.
fn proxyfleet(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("proxyfleet").expect("proxyfleet binary should exist");
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.env("PROXYFLEET_CONFIG", dir.join("config.yaml"));
    cmd.current_dir(dir);
    cmd
}

const TWO_ROWS: &str = "101,203.0.113.1,2024-05-01T09:00:00Z,8001\n\
                        102,203.0.113.2,2024-05-01T09:00:05Z,8002\n";

// --- Help and version tests ---

#[test]
fn test_cli_no_args_shows_help() {
    let dir = tempfile::tempdir().expect("tempdir");
    proxyfleet(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("SOCKS tunnels"));
}

#[test]
fn test_cli_help_lists_commands() {
    let dir = tempfile::tempdir().expect("tempdir");
    proxyfleet(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("records"))
        .stdout(predicate::str::contains("exec"));
}

#[test]
fn test_version_command_shows_version() {
    let dir = tempfile::tempdir().expect("tempdir");
    proxyfleet(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("proxyfleet 0.1.0"));
}

#[test]
fn test_version_command_json_outputs_valid_json() {
    let dir = tempfile::tempdir().expect("tempdir");
    proxyfleet(dir.path())
        .args(["version", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#"{"version":"0.1.0"}"#));
}

// --- up ---

#[test]
fn test_up_without_token_fails_before_creating_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    proxyfleet(dir.path())
        .args(["up", "--ssh-key", "12345853"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "Error: Environment variable DIGITALOCEAN_ACCESS_TOKEN not set.",
        ));
    assert!(!dir.path().join("droplets.csv").exists());
}

#[test]
fn test_up_rejects_zero_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    proxyfleet(dir.path())
        .args(["up", "-n", "0", "--ssh-key", "12345853"])
        .env("DIGITALOCEAN_ACCESS_TOKEN", "dop_v1_test")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("fleet size must be at least 1"));
}

#[test]
fn test_up_requires_ssh_key() {
    let dir = tempfile::tempdir().expect("tempdir");
    proxyfleet(dir.path())
        .arg("up")
        .env("DIGITALOCEAN_ACCESS_TOKEN", "dop_v1_test")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("ssh key must not be empty"));
}

#[test]
fn test_up_reads_ssh_key_from_config_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("config.yaml"), "ssh_key: \"12345853\"\n").expect("write");
    // Passes config validation and stops at the missing token.
    proxyfleet(dir.path())
        .arg("up")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("DIGITALOCEAN_ACCESS_TOKEN"));
}

// --- records ---

#[test]
fn test_records_lists_logged_tunnels() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("droplets.csv"), TWO_ROWS).expect("write");
    proxyfleet(dir.path())
        .args(["records", "--no-color"])
        .assert()
        .success()
        .stdout(predicate::str::contains("socks5h://127.0.0.1:8001"))
        .stdout(predicate::str::contains("203.0.113.2"));
}

#[test]
fn test_records_json_is_array() {
    let dir = tempfile::tempdir().expect("tempdir");
    let log = dir.path().join("fleet.csv");
    std::fs::write(&log, TWO_ROWS).expect("write");

    let out = proxyfleet(dir.path())
        .args(["records", "--json", "--record-log"])
        .arg(&log)
        .output()
        .expect("run");

    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("valid JSON");
    assert_eq!(v.as_array().map(Vec::len), Some(2));
    assert_eq!(v[1]["id"], 102);
    assert_eq!(v[1]["proxy"], "socks5h://127.0.0.1:8002");
}

#[test]
fn test_records_missing_log_is_empty() {
    let dir = tempfile::tempdir().expect("tempdir");
    proxyfleet(dir.path())
        .args(["records", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[]"));
}

#[test]
fn test_records_malformed_row_names_line() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("droplets.csv"),
        "101,203.0.113.1,2024-05-01T09:00:00Z,8001\nnot-a-row\n",
    )
    .expect("write");
    proxyfleet(dir.path())
        .arg("records")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cannot parse"));
}

// --- exec ---

#[test]
fn test_exec_without_records_does_not_run_command() {
    let dir = tempfile::tempdir().expect("tempdir");
    let marker = dir.path().join("ran");
    proxyfleet(dir.path())
        .args(["exec", "--", "touch"])
        .arg(&marker)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no tunnels"));
    assert!(!marker.exists());
}

#[test]
fn test_exec_repeat_without_records_reads_no_commands() {
    let dir = tempfile::tempdir().expect("tempdir");
    proxyfleet(dir.path())
        .args(["exec", "--repeat"])
        .write_stdin("id\nexit\n")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no tunnels"));
}

// --- JSON errors ---

#[test]
fn test_json_error_is_reported_on_stdout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = proxyfleet(dir.path())
        .args(["up", "--json", "--ssh-key", "12345853"])
        .output()
        .expect("run");

    assert_eq!(out.status.code(), Some(1));
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).expect("valid JSON");
    assert_eq!(v["error"], true);
    assert_eq!(v["code"], "CONFIG_INVALID");
    assert!(
        v["message"]
            .as_str()
            .is_some_and(|m| m.contains("DIGITALOCEAN_ACCESS_TOKEN")),
        "got: {v}"
    );
}
