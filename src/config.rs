//! Configuration system for psylab
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. CLI arguments
//! 2. Environment variables (PSYLAB_* prefix)
//! 3. Configuration file (TOML)
//! 4. Default values

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::inference::OpenAiConfig;
use crate::session::{ThrottlePolicy, DEFAULT_SAVE_EVERY_MESSAGES, DEFAULT_SAVE_INTERVAL_MS};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PsylabConfig {
    /// Logging configuration
    pub logging: LoggingSettings,

    /// Catalog store backend and location
    pub storage: StorageSettings,

    /// OpenAI-compatible inference service
    pub inference: InferenceSettings,

    /// Session persistence and metadata
    pub session: SessionSettings,

    /// Experiment selection
    pub experiment: ExperimentSettings,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated daily log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One JSON document per record under `data_dir`
    File,
    /// Process-local; nothing survives exit
    Memory,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageBackend::File => write!(f, "file"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(Error::Config(format!(
                "Invalid storage backend '{}'. Must be one of: file, memory",
                s
            ))),
        }
    }
}

/// Storage settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub backend: StorageBackend,

    /// Base data directory for the file backend
    pub data_dir: String,
}

/// Inference service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceSettings {
    /// API base URL, including the version prefix
    pub base_url: String,

    /// API key (empty for local servers like Ollama)
    pub api_key: String,

    /// Model used unless overridden on the command line
    pub default_model: String,

    /// TCP connect timeout in seconds
    pub connect_timeout_secs: u64,
}

/// Session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Throttled writes happen at least this often (ms)
    pub save_interval_ms: u64,

    /// Throttled writes also happen whenever the message count is a multiple of this
    pub save_every_messages: usize,

    /// User agent recorded in session metadata (defaults to the build's own)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// Experiment selection settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentSettings {
    /// Experiment id to run (default: the first active one)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_experiment: Option<String>,

    /// Seed for assignment and delay draws (default: OS entropy)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

// ─────────────────────────────────────────────────────────────────
// Default implementations
// ─────────────────────────────────────────────────────────────────

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            data_dir: "~/.psylab/data".to_string(),
        }
    }
}

impl Default for InferenceSettings {
    fn default() -> Self {
        let defaults = OpenAiConfig::default();
        Self {
            base_url: defaults.base_url,
            api_key: defaults.api_key,
            default_model: defaults.default_model,
            connect_timeout_secs: defaults.connect_timeout_secs,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            save_interval_ms: DEFAULT_SAVE_INTERVAL_MS,
            save_every_messages: DEFAULT_SAVE_EVERY_MESSAGES,
            user_agent: None,
        }
    }
}

impl InferenceSettings {
    pub fn to_openai_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            default_model: self.default_model.clone(),
            connect_timeout_secs: self.connect_timeout_secs,
        }
    }
}

impl SessionSettings {
    pub fn throttle_policy(&self) -> ThrottlePolicy {
        ThrottlePolicy {
            interval_ms: self.save_interval_ms,
            every_messages: self.save_every_messages,
        }
    }

    pub fn user_agent(&self) -> String {
        self.user_agent
            .clone()
            .unwrap_or_else(crate::version::default_user_agent)
    }
}

fn env_flag(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

impl PsylabConfig {
    /// Load configuration from the given file, or the first one found in
    /// the standard locations, then apply environment overrides.
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: format!("{}: {}", path.display(), e.message()),
            source: Some(e),
        })
    }

    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::ConfigNotFound { path });
        }

        for path in Self::search_paths() {
            if path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Standard locations, in search order.
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("psylab.toml")];
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("psylab").join("config.toml"));
        }
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".psylab").join("config.toml"));
        }
        paths.push(PathBuf::from("/etc/psylab/config.toml"));
        paths
    }

    pub(crate) fn apply_env_overrides(&mut self) {
        // Logging settings
        if let Ok(val) = std::env::var("PSYLAB_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("PSYLAB_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("PSYLAB_LOG_JSON") {
            self.logging.json_format = env_flag(&val);
        }

        // Storage settings
        if let Ok(val) = std::env::var("PSYLAB_STORAGE_BACKEND") {
            if let Ok(backend) = val.parse() {
                self.storage.backend = backend;
            }
        }
        if let Ok(val) = std::env::var("PSYLAB_DATA_DIR") {
            self.storage.data_dir = val;
        }

        // Inference settings
        if let Ok(val) = std::env::var("PSYLAB_INFERENCE_BASE_URL") {
            self.inference.base_url = val;
        }
        if let Ok(val) = std::env::var("PSYLAB_INFERENCE_API_KEY") {
            self.inference.api_key = val;
        }
        if let Ok(val) = std::env::var("PSYLAB_INFERENCE_MODEL") {
            self.inference.default_model = val;
        }
        if let Ok(val) = std::env::var("PSYLAB_INFERENCE_CONNECT_TIMEOUT_SECS") {
            if let Ok(n) = val.parse() {
                self.inference.connect_timeout_secs = n;
            }
        }

        // Session settings
        if let Ok(val) = std::env::var("PSYLAB_SAVE_INTERVAL_MS") {
            if let Ok(n) = val.parse() {
                self.session.save_interval_ms = n;
            }
        }
        if let Ok(val) = std::env::var("PSYLAB_SAVE_EVERY_MESSAGES") {
            if let Ok(n) = val.parse() {
                self.session.save_every_messages = n;
            }
        }
        if let Ok(val) = std::env::var("PSYLAB_USER_AGENT") {
            self.session.user_agent = Some(val);
        }

        // Experiment settings
        if let Ok(val) = std::env::var("PSYLAB_EXPERIMENT") {
            self.experiment.active_experiment = Some(val);
        }
        if let Ok(val) = std::env::var("PSYLAB_SEED") {
            if let Ok(n) = val.parse() {
                self.experiment.seed = Some(n);
            }
        }
    }

    pub(crate) fn expand_paths(&mut self) {
        self.storage.data_dir = expand_path(&self.storage.data_dir);

        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    pub fn validate(&self) -> Result<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_levels.join(", ")
            )));
        }

        // Validate inference URL
        let url = url::Url::parse(&self.inference.base_url).map_err(|e| {
            Error::Config(format!("Invalid inference base_url '{}': {}", self.inference.base_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::Config(
                "Inference base_url must start with http:// or https://".to_string(),
            ));
        }
        if self.inference.default_model.trim().is_empty() {
            return Err(Error::Config("Inference default_model cannot be empty".to_string()));
        }

        // Validate storage
        if self.storage.backend == StorageBackend::File && self.storage.data_dir.trim().is_empty() {
            return Err(Error::Config(
                "storage.data_dir is required for the file backend".to_string(),
            ));
        }

        // Validate throttle
        if self.session.save_interval_ms == 0 {
            return Err(Error::Config("session.save_interval_ms must be greater than 0".to_string()));
        }
        if self.session.save_every_messages == 0 {
            return Err(Error::Config(
                "session.save_every_messages must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.data_dir)
    }

    /// Default location for `config init`.
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".psylab")
            .join("config.toml")
    }
}

fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Write a commented default configuration file. Returns the path written.
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(PsylabConfig::default_path);

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|source| Error::IoWrite {
            path: parent.to_path_buf(),
            source,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|source| Error::IoWrite {
        path: config_path.clone(),
        source,
    })?;

    Ok(config_path)
}

pub fn generate_default_config() -> String {
    r#"# psylab configuration

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.psylab/logs/psylab.log"

# Number of rotated daily log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false

[storage]
# Catalog store: "file" or "memory"
backend = "file"

# Base data directory (one subdirectory per collection)
data_dir = "~/.psylab/data"

[inference]
# OpenAI-compatible API base URL (Ollama by default)
base_url = "http://localhost:11434/v1"

# API key (leave empty for local servers)
api_key = ""

# Model used unless --model is given
default_model = "llama3"

# TCP connect timeout in seconds; streamed replies have no deadline
connect_timeout_secs = 10

[session]
# Throttled session writes happen when this many ms passed since the last write
save_interval_ms = 30000

# ...or when the message count is a multiple of this
save_every_messages = 5

# User agent recorded with each session (defaults to "psylab/<version> (<os>; <arch>)")
# user_agent = "Mozilla/5.0 (iPad; CPU OS 17_0 like Mac OS X)"

[experiment]
# Experiment to run (default: the first active experiment in the catalog)
# active_experiment = "response-timing-pilot"

# Seed for assignment and delay draws (default: random)
# seed = 42
"#
    .to_string()
}
