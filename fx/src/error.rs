//! FX error types.

use thiserror::Error;

/// Errors that can occur while fetching or caching rates.
#[derive(Debug, Clone, Error)]
pub enum FxError {
    /// Network failure or non-2xx response from the provider.
    #[error("Upstream unavailable ({endpoint}): {reason}")]
    UpstreamUnavailable { endpoint: String, reason: String },

    /// Provider payload does not match the expected shape.
    #[error("Upstream schema invalid ({endpoint}): {}", issues.join("; "))]
    UpstreamSchemaInvalid { endpoint: String, issues: Vec<String> },

    /// No snapshot has been produced yet.
    #[error("No rate snapshot available")]
    SnapshotUnavailable,

    /// Provider client could not be constructed.
    #[error("Provider configuration error: {0}")]
    Configuration(String),
}

impl FxError {
    /// Build an unavailable error for an endpoint.
    pub fn unavailable(endpoint: impl Into<String>, reason: impl ToString) -> Self {
        FxError::UpstreamUnavailable {
            endpoint: endpoint.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if the next refresh cycle may succeed where this one failed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FxError::UpstreamUnavailable { .. } | FxError::SnapshotUnavailable
        )
    }

    /// Get error code for subscriber-facing events.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            FxError::UpstreamSchemaInvalid { .. } => "UPSTREAM_SCHEMA_INVALID",
            FxError::SnapshotUnavailable => "SNAPSHOT_UNAVAILABLE",
            FxError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }
}

/// Result type for FX operations.
pub type FxResult<T> = Result<T, FxError>;
