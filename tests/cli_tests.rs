//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the psylab binary, isolated from any user config
fn psylab_cmd(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("psylab").unwrap();
    cmd.current_dir(home.path())
        .env("HOME", home.path())
        .env("XDG_CONFIG_HOME", home.path().join(".config"))
        .env("PSYLAB_DATA_DIR", home.path().join("data"))
        .env_remove("PSYLAB_CONFIG")
        .env_remove("PSYLAB_STORAGE_BACKEND")
        .env_remove("RUST_LOG");
    cmd
}

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    let home = TempDir::new().unwrap();
    psylab_cmd(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("catalog"))
        .stdout(predicate::str::contains("sessions"))
        .stdout(predicate::str::contains("config"))
        .stdout(predicate::str::contains("version"));
}

#[test]
fn test_version_command() {
    let home = TempDir::new().unwrap();
    psylab_cmd(&home)
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::starts_with("psylab"))
        .stdout(predicate::str::contains("branch:"))
        .stdout(predicate::str::contains("target:"));
}

#[test]
fn test_version_json() {
    let home = TempDir::new().unwrap();
    let output = psylab_cmd(&home)
        .args(["version", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let info: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(info["name"], "psylab");
    assert!(info["git_dirty"].is_boolean());
}

#[test]
fn test_short_version_flag() {
    let home = TempDir::new().unwrap();
    psylab_cmd(&home)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("psylab"));
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_default() {
    let home = TempDir::new().unwrap();
    psylab_cmd(&home)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[logging]"))
        .stdout(predicate::str::contains("[storage]"))
        .stdout(predicate::str::contains("[inference]"))
        .stdout(predicate::str::contains("[session]"));
}

#[test]
fn test_config_validate_default() {
    let home = TempDir::new().unwrap();
    psylab_cmd(&home)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_config_validate_nonexistent_file() {
    let home = TempDir::new().unwrap();
    psylab_cmd(&home)
        .args(["config", "validate", "--config", "/nonexistent/path/config.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_config_init_then_validate() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("psylab.toml");

    psylab_cmd(&home)
        .args(["config", "init", "--path"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration written"));
    assert!(path.exists());

    psylab_cmd(&home)
        .args(["config", "validate", "--config"])
        .arg(&path)
        .assert()
        .success();

    // A second init without --force refuses to overwrite
    psylab_cmd(&home)
        .args(["config", "init", "--path"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

// ─────────────────────────────────────────────────────────────────
// Catalog and Sessions Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_catalog_seeds_defaults() {
    let home = TempDir::new().unwrap();
    psylab_cmd(&home)
        .arg("catalog")
        .assert()
        .success()
        .stdout(predicate::str::contains("Personas:"))
        .stdout(predicate::str::contains("anxious-patient"))
        .stdout(predicate::str::contains("fixed-delay"))
        .stdout(predicate::str::contains("response-timing-pilot"));

    assert!(home.path().join("data").join("personas").exists());
}

#[test]
fn test_catalog_memory_backend_writes_nothing() {
    let home = TempDir::new().unwrap();
    psylab_cmd(&home)
        .env("PSYLAB_STORAGE_BACKEND", "memory")
        .arg("catalog")
        .assert()
        .success()
        .stdout(predicate::str::contains("cbt-psychologist"));

    assert!(!home.path().join("data").exists());
}

#[test]
fn test_sessions_list_empty() {
    let home = TempDir::new().unwrap();
    psylab_cmd(&home)
        .args(["sessions", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("0 sessions"));
}

#[test]
fn test_sessions_export_to_file() {
    let home = TempDir::new().unwrap();
    let out = home.path().join("sessions.csv");

    psylab_cmd(&home)
        .args(["sessions", "export", "--output"])
        .arg(&out)
        .assert()
        .success();

    let csv = std::fs::read_to_string(&out).unwrap();
    assert!(csv.starts_with("sessionId,participantId,experiment,persona,condition"));
}

#[test]
fn test_chat_with_invalid_config() {
    let home = TempDir::new().unwrap();
    psylab_cmd(&home)
        .args(["chat", "--config", "/nonexistent/config.toml"])
        .assert()
        .failure();
}

#[test]
fn test_chat_requires_consent_for_pilot() {
    let home = TempDir::new().unwrap();
    psylab_cmd(&home)
        .env("PSYLAB_STORAGE_BACKEND", "memory")
        .env("PSYLAB_INFERENCE_BASE_URL", "http://127.0.0.1:9/v1")
        .env("PSYLAB_INFERENCE_CONNECT_TIMEOUT_SECS", "1")
        .args(["chat", "--experiment", "response-timing-pilot"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("consent"));
}

// ─────────────────────────────────────────────────────────────────
// Flag and Error Handling Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_verbosity_flags() {
    let home = TempDir::new().unwrap();
    psylab_cmd(&home).args(["-vv", "version"]).assert().success();
    psylab_cmd(&home).args(["--quiet", "version"]).assert().success();
}

#[test]
fn test_unknown_command() {
    let home = TempDir::new().unwrap();
    psylab_cmd(&home)
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_subcommand() {
    let home = TempDir::new().unwrap();
    psylab_cmd(&home).assert().failure();
}
