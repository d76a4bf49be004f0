//! Error types for the sandbox runtime
//!
//! Every failure a caller can observe is a variant of [`SandboxError`]. The
//! `Display` text carries operator detail and is meant for logs; the text
//! handed back to callers comes from [`SandboxError::user_message`], which never
//! includes host paths, daemon responses or other internal detail.
//!
//! Container engine failures have their own [`EngineError`] type. It is caught
//! at the lifecycle manager boundary and never returned to callers directly.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SandboxError {
    #[error("Invalid runtime configuration for '{field}': {message}")]
    ConfigValidation { field: String, message: String },
    #[error("No code provided to execute")]
    EmptyCode,
    #[error("Code payload too large: {actual} characters (maximum {max})")]
    PayloadTooLarge { actual: usize, max: usize },
    #[error("Timeout must be between {min} and {max} seconds, got {actual}")]
    InvalidTimeout { actual: i64, min: u64, max: u64 },
    #[error("Unsafe value rejected for '{field}': {value}")]
    UnsafePath { field: String, value: String },
    #[error("Security profile could not be established: {0}")]
    SecurityProfile(String),
    #[error("Image '{image}' is unavailable: {reason}")]
    ImageUnavailable { image: String, reason: String },
    #[error("Container orchestration failed: {0}")]
    Orchestration(String),
    #[error("Runtime already registered for language '{0}'")]
    DuplicateRuntime(String),
    #[error("Unknown runtime '{language}'. Available: {available:?}")]
    UnknownRuntime {
        language: String,
        available: Vec<String>,
    },
    #[error("Settings error: {0}")]
    Settings(String),
}

impl SandboxError {
    pub(crate) fn config(field: &str, message: impl Into<String>) -> Self {
        SandboxError::ConfigValidation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// True for errors caused by the request itself rather than the sandbox.
    pub fn is_request_error(&self) -> bool {
        matches!(
            self,
            SandboxError::EmptyCode
                | SandboxError::PayloadTooLarge { .. }
                | SandboxError::InvalidTimeout { .. }
                | SandboxError::UnsafePath { .. }
        )
    }

    /// Caller-facing text with internal detail stripped.
    pub fn user_message(&self) -> String {
        match self {
            SandboxError::ConfigValidation { field, .. } => {
                format!("Invalid sandbox configuration ({}).", field)
            }
            SandboxError::EmptyCode => "No code provided to execute.".to_string(),
            SandboxError::PayloadTooLarge { actual, max } => format!(
                "Code too long. Maximum: {} characters (got {}).",
                max, actual
            ),
            SandboxError::InvalidTimeout { min, max, .. } => {
                format!("Timeout must be between {} and {} seconds.", min, max)
            }
            SandboxError::UnsafePath { field, .. } => {
                format!("Rejected unsafe value for {}.", field)
            }
            SandboxError::SecurityProfile(_) => {
                "Execution refused: the sandbox security policy is unavailable.".to_string()
            }
            SandboxError::ImageUnavailable { .. } => {
                "Execution environment unavailable.".to_string()
            }
            SandboxError::Orchestration(_) => {
                "Sandbox execution failed due to an internal error.".to_string()
            }
            SandboxError::DuplicateRuntime(language) => {
                format!("A runtime for '{}' is already registered.", language)
            }
            SandboxError::UnknownRuntime { language, .. } => {
                format!("Unsupported language: {}.", language)
            }
            SandboxError::Settings(_) => "Invalid sandbox settings.".to_string(),
        }
    }
}

/// Failures reported by a [`crate::executors::ContainerEngine`].
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Bollard (Docker client) error: {0}")]
    BollardError(#[from] bollard::errors::Error),
    #[error("Container engine unavailable: {0}")]
    Unavailable(String),
    #[error("Image build failed: {0}")]
    BuildFailed(String),
    #[error("Container wait stream ended unexpectedly for {0}")]
    WaitStreamEnded(String),
    #[error("I/O error during engine operation: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Engine operation failed: {0}")]
    Other(String),
}
