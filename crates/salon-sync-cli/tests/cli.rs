//! End-to-end tests for the `salon-sync` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Command isolated from the caller's configuration files and environment
fn salon_sync(workdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("salon-sync").unwrap();
    cmd.current_dir(workdir.path())
        .env("HOME", workdir.path())
        .env("XDG_CONFIG_HOME", workdir.path())
        .env_remove("SALON_SYNC_CONFIG_FILE")
        .env_remove("SALON_SYNC_WEBHOOK_SECRET");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();

    salon_sync(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sync"))
        .stdout(predicate::str::contains("sign"))
        .stdout(predicate::str::contains("completions"));
}

/// Verify that `sign` prints exactly the hex digest on stdout.
#[test]
fn test_sign_payload_file() {
    let dir = TempDir::new().unwrap();
    let payload = dir.path().join("booking.json");
    fs::write(&payload, r#"{"id":"b-1"}"#).unwrap();

    let output = salon_sync(&dir)
        .args(["sign", "--secret", "salon-secret"])
        .arg(&payload)
        .output()
        .unwrap();

    assert!(output.status.success());
    let digest = String::from_utf8(output.stdout).unwrap();
    let digest = digest.trim();
    assert_eq!(digest.len(), 64);
    assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
}

#[test]
fn test_sign_secret_from_environment() {
    let dir = TempDir::new().unwrap();
    let payload = dir.path().join("booking.json");
    fs::write(&payload, "{}").unwrap();

    salon_sync(&dir)
        .env("SALON_SYNC_WEBHOOK_SECRET", "salon-secret")
        .args(["sign", "--prefixed"])
        .arg(&payload)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("sha256="));
}

#[test]
fn test_sign_missing_file() {
    let dir = TempDir::new().unwrap();

    salon_sync(&dir)
        .args(["sign", "--secret", "s", "absent.json"])
        .assert()
        .code(5);
}

/// Verify that `config --show` renders the file merged over defaults.
#[test]
fn test_config_show() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("service.yaml");
    fs::write(
        &file,
        "server:\n  port: 9300\nwebhooks:\n  secret: do-not-print\n",
    )
    .unwrap();

    salon_sync(&dir)
        .args(["config", "--show", "--format", "json", "--file"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("9300"))
        .stdout(predicate::str::contains("/api/wix-webhook"))
        .stdout(predicate::str::contains("do-not-print").not());
}

#[test]
fn test_config_defaults_are_valid() {
    let dir = TempDir::new().unwrap();

    salon_sync(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_invalid_config_exit_code() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("service.yaml");
    fs::write(&file, "wix:\n  page_size: 500\n").unwrap();

    salon_sync(&dir)
        .arg("--config")
        .arg(&file)
        .arg("config")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("page_size"));
}

/// Verify that `sync` refuses to run without a datastore.
#[test]
fn test_sync_without_datastore() {
    let dir = TempDir::new().unwrap();

    salon_sync(&dir)
        .args(["sync", "bookings"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("datastore.url"));
}

#[test]
fn test_completions() {
    let dir = TempDir::new().unwrap();

    salon_sync(&dir)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("salon-sync"));
}
