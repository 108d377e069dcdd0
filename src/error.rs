//! Error types for state accounting operations

use thiserror::Error;

/// Main error type for state accounting operations
#[derive(Error, Debug)]
pub enum StateError {
    /// The sample log could not be reached or failed mid-scan
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Malformed window or pagination request, rejected before any scan
    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    /// The key is unknown to the configuration layer
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// The caller cancelled the request while a scan was in flight
    #[error("Request cancelled")]
    Cancelled,

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing failed
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing failed
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Result type alias for state accounting operations
pub type Result<T> = std::result::Result<T, StateError>;

impl StateError {
    /// Check if the caller may retry the request unchanged
    pub fn is_retryable(&self) -> bool {
        matches!(self, StateError::StoreUnavailable(_))
    }

    /// Get error severity
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            StateError::InvalidWindow(_) | StateError::KeyNotFound(_) => ErrorSeverity::Warning,
            StateError::Cancelled => ErrorSeverity::Warning,
            StateError::Configuration(_) => ErrorSeverity::Fatal,
            _ => ErrorSeverity::Error,
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Client-side mistakes or aborted requests
    Warning,
    /// Failures that may succeed on retry
    Error,
    /// Failures that prevent the engine from starting
    Fatal,
}

/// Error chain helper for adding context
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Add context with format
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ErrorContext<T> for Result<T> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| wrap(e, msg.into()))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| wrap(e, f()))
    }
}

// Keeps the variant so retry classification survives the added context.
fn wrap(err: StateError, msg: String) -> StateError {
    match err {
        StateError::StoreUnavailable(inner) => {
            StateError::StoreUnavailable(format!("{}: {}", msg, inner))
        }
        StateError::InvalidWindow(inner) => StateError::InvalidWindow(format!("{}: {}", msg, inner)),
        StateError::KeyNotFound(inner) => StateError::KeyNotFound(format!("{}: {}", msg, inner)),
        StateError::Configuration(inner) => {
            StateError::Configuration(format!("{}: {}", msg, inner))
        }
        other => other,
    }
}
