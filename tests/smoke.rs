//! Smoke tests -- verify the binary runs and rejects bad configuration.

use assert_cmd::Command;

#[test]
fn test_cli_help() {
    Command::cargo_bin("logwarden")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicates::str::contains("Batch anomaly detection"));
}

#[test]
fn test_cli_version() {
    Command::cargo_bin("logwarden")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicates::str::contains("logwarden"));
}

#[test]
fn test_missing_config_file_fails() {
    Command::cargo_bin("logwarden")
        .unwrap()
        .args(["--config", "/nonexistent/logwarden.toml"])
        .assert()
        .failure();
}

#[test]
fn test_invalid_override_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logwarden.toml");
    std::fs::write(&path, "batch_size = 10\n").unwrap();

    Command::cargo_bin("logwarden")
        .unwrap()
        .arg("--config")
        .arg(&path)
        .env("LOGWARDEN_CONTAMINATION", "0.9")
        .assert()
        .failure();
}
