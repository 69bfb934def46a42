//! Configuration system tests
//!
//! Tests configuration loading, validation, and environment overrides
//! through the public API and the `config` subcommands.

use std::fs;
use std::path::PathBuf;

use predicates::prelude::*;
use tempfile::TempDir;

use psylab::config::{PsylabConfig, StorageBackend};
use psylab::error::Error;

/// Test fixture for configuration testing
struct ConfigFixture {
    temp_dir: TempDir,
    config_path: PathBuf,
}

impl ConfigFixture {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.toml");
        Self { temp_dir, config_path }
    }

    fn write_config(&self, content: &str) {
        fs::write(&self.config_path, content).unwrap();
    }

    fn path(&self) -> &str {
        self.config_path.to_str().unwrap()
    }

    fn cmd(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::Command::cargo_bin("psylab").unwrap();
        cmd.current_dir(self.temp_dir.path())
            .env("HOME", self.temp_dir.path())
            .env_remove("PSYLAB_CONFIG")
            .env_remove("PSYLAB_LOG_LEVEL")
            .env_remove("PSYLAB_INFERENCE_BASE_URL")
            .env_remove("PSYLAB_INFERENCE_MODEL");
        cmd
    }
}

// ─────────────────────────────────────────────────────────────────
// Valid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_minimal_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");

    let config = PsylabConfig::from_file(&fixture.config_path).unwrap();
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.storage.backend, StorageBackend::File);
    assert_eq!(config.session.save_interval_ms, 30_000);
    assert_eq!(config.session.save_every_messages, 5);
    assert!(config.validate().is_ok());
}

#[test]
fn test_full_config() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[logging]
level = "debug"
file = "/tmp/psylab-test.log"
max_files = 3
json_format = true

[storage]
backend = "memory"
data_dir = "/tmp/psylab/data"

[inference]
base_url = "https://api.example.com/v1"
api_key = "sk-test"
default_model = "gpt-4o-mini"
connect_timeout_secs = 5

[session]
save_interval_ms = 10000
save_every_messages = 2
user_agent = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)"

[experiment]
active_experiment = "therapist-style-study"
seed = 42
"#,
    );

    let config = PsylabConfig::from_file(&fixture.config_path).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.storage.backend, StorageBackend::Memory);
    assert_eq!(config.inference.default_model, "gpt-4o-mini");
    assert_eq!(config.session.throttle_policy().every_messages, 2);
    assert_eq!(config.experiment.seed, Some(42));
    assert_eq!(
        config.experiment.active_experiment.as_deref(),
        Some("therapist-style-study")
    );

    let openai = config.inference.to_openai_config();
    assert_eq!(openai.api_key, "sk-test");
    assert_eq!(openai.connect_timeout_secs, 5);

    fixture
        .cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .success();
}

// ─────────────────────────────────────────────────────────────────
// Invalid Configuration Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_invalid_base_url_scheme() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[inference]
base_url = "ftp://models.example.com"
"#,
    );

    let config = PsylabConfig::from_file(&fixture.config_path).unwrap();
    assert!(matches!(config.validate(), Err(Error::Config(_))));

    fixture
        .cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("base_url"));
}

#[test]
fn test_invalid_throttle() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[session]
save_every_messages = 0
"#,
    );

    fixture
        .cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure();
}

#[test]
fn test_invalid_storage_backend() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[storage]
backend = "postgres"
"#,
    );

    let err = PsylabConfig::from_file(&fixture.config_path).unwrap_err();
    assert!(matches!(err, Error::ConfigParse { .. }));
}

#[test]
fn test_invalid_log_level() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[logging]
level = "invalid_level"
"#,
    );

    fixture
        .cmd()
        .args(["config", "validate", "--config", fixture.path()])
        .assert()
        .failure();
}

#[test]
fn test_malformed_toml() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[inference
base_url = "http://localhost:11434/v1"
"#,
    );

    let err = PsylabConfig::from_file(&fixture.config_path).unwrap_err();
    assert!(matches!(err, Error::ConfigParse { .. }));
    assert!(err.suggestion().is_some());
}

// ─────────────────────────────────────────────────────────────────
// Config Show / Init Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_custom() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[inference]
base_url = "http://gpu-box:8000/v1"
default_model = "qwen2.5-7b"
"#,
    );

    fixture
        .cmd()
        .args(["config", "show", "--config", fixture.path()])
        .assert()
        .success()
        .stdout(predicate::str::contains("http://gpu-box:8000/v1"))
        .stdout(predicate::str::contains("qwen2.5-7b"));
}

#[test]
fn test_config_init_force_overwrite() {
    let fixture = ConfigFixture::new();
    fixture.write_config("[experiment]\nactive_experiment = \"old-study\"\n");

    fixture
        .cmd()
        .args(["config", "init", "--path", fixture.path(), "--force"])
        .assert()
        .success();

    let content = fs::read_to_string(&fixture.config_path).unwrap();
    assert!(!content.contains("old-study"));
    assert!(content.contains("[inference]"));
}

// ─────────────────────────────────────────────────────────────────
// Environment Variable Override Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_env_override_inference() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[inference]
base_url = "http://file.example.com/v1"
"#,
    );

    fixture
        .cmd()
        .args(["config", "show", "--config", fixture.path()])
        .env("PSYLAB_INFERENCE_BASE_URL", "http://env.example.com/v1")
        .env("PSYLAB_SAVE_EVERY_MESSAGES", "7")
        .assert()
        .success()
        .stdout(predicate::str::contains("http://env.example.com/v1"))
        .stdout(predicate::str::contains("save_every_messages = 7"));
}

#[test]
fn test_env_override_storage_backend() {
    let fixture = ConfigFixture::new();
    fixture.write_config("");

    fixture
        .cmd()
        .args(["config", "show", "--config", fixture.path()])
        .env("PSYLAB_STORAGE_BACKEND", "memory")
        .assert()
        .success()
        .stdout(predicate::str::contains("backend = \"memory\""));
}

// ─────────────────────────────────────────────────────────────────
// Path Expansion Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_tilde_expansion() {
    let fixture = ConfigFixture::new();
    fixture.write_config(
        r#"
[storage]
data_dir = "~/psylab/data"
"#,
    );

    let output = fixture
        .cmd()
        .args(["config", "show", "--config", fixture.path()])
        .env_remove("PSYLAB_DATA_DIR")
        .assert()
        .success();

    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();
    assert!(!stdout.contains("data_dir = \"~"));
    assert!(stdout.contains("psylab/data"));
}
