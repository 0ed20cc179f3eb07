//! Result and error types for PaySync.

use crate::driver::{DriverError, InteractionError};
use thiserror::Error;

/// Result type for PaySync operations
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while driving a scenario
#[derive(Debug, Error)]
pub enum SyncError {
    /// Browser launch error
    #[error("Failed to launch browser: {message}")]
    BrowserLaunch {
        /// Error message
        message: String,
    },

    /// The browser session went away while it was still in use
    #[error("Browser session closed: {message}")]
    SessionClosed {
        /// Error message
        message: String,
    },

    /// Driver-level failure outside the interaction taxonomy
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// A wait condition did not hold within its budget
    #[error("{condition}, timeout after {elapsed_ms}ms (current URL: {})", .url.as_deref().unwrap_or("unknown"))]
    Timeout {
        /// Description of the unmet condition
        condition: String,
        /// Time spent waiting
        elapsed_ms: u64,
        /// URL observed when the wait gave up
        url: Option<String>,
    },

    /// Both the native action and its fallback failed
    #[error("{action} failed: {primary}; fallback failed: {fallback}")]
    FinalFailure {
        /// Action that was attempted
        action: String,
        /// Failure of the native attempt
        primary: InteractionError,
        /// Failure of the fallback attempt
        fallback: InteractionError,
    },

    /// A post-condition expected by the scenario did not hold
    #[error("Assertion failed: {message} (current URL: {})", .url.as_deref().unwrap_or("unknown"))]
    AssertionFailed {
        /// Error message
        message: String,
        /// URL observed when the assertion failed
        url: Option<String>,
    },

    /// Configuration or credential error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Feature file or step error
    #[error("Scenario error: {message}")]
    Scenario {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl SyncError {
    /// Create an assertion failure
    #[must_use]
    pub fn assertion(message: impl Into<String>, url: Option<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
            url,
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a scenario error
    #[must_use]
    pub fn scenario(message: impl Into<String>) -> Self {
        Self::Scenario {
            message: message.into(),
        }
    }

    /// Whether this error is a wait timeout
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

impl From<DriverError> for SyncError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::SessionClosed { message } => Self::SessionClosed { message },
            other => Self::Driver {
                message: other.to_string(),
            },
        }
    }
}
