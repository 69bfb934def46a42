//! Error types for psylab
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Exit codes for CLI
//!
//! Persistence failures are the one category that is never propagated:
//! the persistence gateway builds them for logging and swallows them.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for psylab operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO / storage errors (2xx)
    IoRead = 200,
    IoWrite = 201,
    IoPermission = 202,
    IoNotFound = 203,
    StorageFailure = 210,
    PersistenceFailure = 211,

    // Assignment errors (3xx)
    NoEligibleOptions = 300,
    InvalidAssignment = 301,
    ConsentRequired = 302,
    NoActiveExperiment = 303,

    // Session errors (4xx)
    NoActiveSession = 400,
    SessionAlreadyActive = 401,

    // Catalog errors (5xx)
    PersonaNotFound = 500,
    CatalogNotLoaded = 501,
    InvalidCondition = 502,

    // Turn / inference errors (6xx)
    InvalidAttachment = 600,
    InferenceFailure = 601,
    TurnCancelled = 602,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO / storage errors
            300..=399 => 30, // Assignment errors
            400..=499 => 40, // Session errors
            500..=599 => 50, // Catalog errors
            600..=699 => 60, // Turn / inference errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO / Storage Errors
    // ─────────────────────────────────────────────────────────────

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Generic IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    /// Catalog store operation failed
    #[error("Storage error in '{collection}': {message}")]
    Storage { collection: String, message: String },

    /// Durable write of a session record failed (logged, never propagated)
    #[error("Failed to persist session {session_id}: {message}")]
    PersistenceFailure { session_id: String, message: String },

    // ─────────────────────────────────────────────────────────────
    // Assignment Errors
    // ─────────────────────────────────────────────────────────────

    /// The experiment has no persona or no condition that is loaded
    #[error("No eligible {kind} for experiment '{experiment_id}'")]
    NoEligibleOptions { experiment_id: String, kind: String },

    /// A chosen persona/condition is not allowed by the experiment
    #[error("Invalid assignment for experiment '{experiment_id}': {reason}")]
    InvalidAssignment { experiment_id: String, reason: String },

    /// Experiment requires consent and none was given
    #[error("Experiment '{experiment_id}' requires participant consent")]
    ConsentRequired { experiment_id: String },

    /// No active experiment could be selected
    #[error("No active experiment: {message}")]
    NoActiveExperiment { message: String },

    // ─────────────────────────────────────────────────────────────
    // Session Errors
    // ─────────────────────────────────────────────────────────────

    /// An operation needs a current session and there is none
    #[error("No active experiment session")]
    NoActiveSession,

    /// A session is already running
    #[error("Session {session_id} is still active")]
    SessionAlreadyActive { session_id: String },

    // ─────────────────────────────────────────────────────────────
    // Catalog Errors
    // ─────────────────────────────────────────────────────────────

    /// Session references a persona missing from a non-empty catalog
    #[error("Persona not found: {persona_id}")]
    PersonaNotFound { persona_id: String },

    /// The persona catalog has not been loaded yet
    #[error("Persona catalog is empty; load the catalog before chatting")]
    CatalogNotLoaded,

    /// Condition settings out of range
    #[error("Invalid condition '{condition_id}': {reason}")]
    InvalidCondition { condition_id: String, reason: String },

    // ─────────────────────────────────────────────────────────────
    // Turn / Inference Errors
    // ─────────────────────────────────────────────────────────────

    /// Attachment URL could not be resolved
    #[error("Invalid attachment '{url}': {reason}")]
    InvalidAttachment { url: String, reason: String },

    /// The inference service failed; the current turn is aborted
    #[error("Inference failed: {message}")]
    InferenceFailure { message: String },

    /// The turn was aborted by the user
    #[error("Turn cancelled")]
    TurnCancelled,

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Io(e) => match e.kind() {
                std::io::ErrorKind::NotFound => ErrorCode::IoNotFound,
                std::io::ErrorKind::PermissionDenied => ErrorCode::IoPermission,
                _ => ErrorCode::IoRead,
            },
            Error::Json(_) => ErrorCode::StorageFailure,
            Error::Toml(_) => ErrorCode::ConfigParseError,
            Error::Storage { .. } => ErrorCode::StorageFailure,
            Error::PersistenceFailure { .. } => ErrorCode::PersistenceFailure,

            Error::NoEligibleOptions { .. } => ErrorCode::NoEligibleOptions,
            Error::InvalidAssignment { .. } => ErrorCode::InvalidAssignment,
            Error::ConsentRequired { .. } => ErrorCode::ConsentRequired,
            Error::NoActiveExperiment { .. } => ErrorCode::NoActiveExperiment,

            Error::NoActiveSession => ErrorCode::NoActiveSession,
            Error::SessionAlreadyActive { .. } => ErrorCode::SessionAlreadyActive,

            Error::PersonaNotFound { .. } => ErrorCode::PersonaNotFound,
            Error::CatalogNotLoaded => ErrorCode::CatalogNotLoaded,
            Error::InvalidCondition { .. } => ErrorCode::InvalidCondition,

            Error::InvalidAttachment { .. } => ErrorCode::InvalidAttachment,
            Error::InferenceFailure { .. } => ErrorCode::InferenceFailure,
            Error::TurnCancelled => ErrorCode::TurnCancelled,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Errors that end the current turn but leave the session usable
    pub fn is_turn_scoped(&self) -> bool {
        matches!(
            self,
            Error::InvalidAttachment { .. }
                | Error::InferenceFailure { .. }
                | Error::TurnCancelled
        )
    }

    /// Configuration integrity violations (the experiment cannot run as configured)
    pub fn is_integrity_violation(&self) -> bool {
        matches!(
            self,
            Error::PersonaNotFound { .. }
                | Error::NoEligibleOptions { .. }
                | Error::InvalidAssignment { .. }
                | Error::InvalidCondition { .. }
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'psylab config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'psylab config validate' to see details."
            ),
            Error::NoEligibleOptions { .. } => Some(
                "The experiment lists personas or conditions that are not in the catalog. Run 'psylab catalog' to inspect it."
            ),
            Error::InvalidAssignment { .. } => Some(
                "Pick a persona and condition listed by the experiment, or enable randomized assignment."
            ),
            Error::ConsentRequired { .. } => Some(
                "Pass --consent once the participant has agreed to take part."
            ),
            Error::NoActiveExperiment { .. } => Some(
                "Mark an experiment as active in the catalog or choose one with --experiment."
            ),
            Error::PersonaNotFound { .. } => Some(
                "Experiment configuration error: the session's persona was removed from the catalog."
            ),
            Error::InvalidAttachment { .. } => Some(
                "Attachments must be absolute URLs (http, https or data:)."
            ),
            Error::InferenceFailure { .. } => Some(
                "Check that the inference server is running and that [inference].base_url is correct."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Error::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create a storage error for a collection
    pub fn storage(collection: impl fmt::Display, message: impl Into<String>) -> Self {
        Error::Storage {
            collection: collection.to_string(),
            message: message.into(),
        }
    }

    /// Create an inference failure
    pub fn inference(message: impl Into<String>) -> Self {
        Error::InferenceFailure {
            message: message.into(),
        }
    }

    /// Create an invalid attachment error
    pub fn invalid_attachment(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidAttachment {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid assignment error
    pub fn invalid_assignment(experiment_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::InvalidAssignment {
            experiment_id: experiment_id.into(),
            reason: reason.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
