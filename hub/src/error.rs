//! Hub error types.

use ratecast_fx::FxError;
use thiserror::Error;

/// Errors surfaced by the hub.
#[derive(Error, Debug, Clone)]
pub enum HubError {
    /// Rate retrieval failed.
    #[error(transparent)]
    Fx(#[from] FxError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl HubError {
    /// Stable code carried by error events.
    pub fn error_code(&self) -> &'static str {
        match self {
            HubError::Fx(e) => e.error_code(),
            HubError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Check if reconnecting later may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            HubError::Fx(e) => e.is_retryable(),
            HubError::Configuration(_) => false,
        }
    }
}

/// Result type for hub operations.
pub type HubResult<T> = Result<T, HubError>;
