//! Error types for the directory API client.

use thiserror::Error;

/// Result type alias using `GraphError`.
pub type GraphResult<T> = Result<T, GraphError>;

/// Errors that can occur when interacting with the directory API.
#[derive(Debug, Error)]
pub enum GraphError {
    /// Configuration validation error (missing secret, bad retry policy).
    /// Fatal at startup, never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Token acquisition error.
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Directory API error response (non-retryable 4xx or exhausted 5xx).
    #[error("Directory API error: {code} - {message}")]
    Api {
        code: String,
        message: String,
        status: u16,
    },

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Maximum retry attempts exceeded.
    #[error("Maximum retries ({attempts}) exceeded")]
    MaxRetriesExceeded { attempts: u32 },

    /// The per-operation timeout elapsed.
    #[error("Operation timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,
}

impl GraphError {
    /// Whether this error would have been retried by the client pipeline.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GraphError::Http(_)
                | GraphError::MaxRetriesExceeded { .. }
                | GraphError::Timeout { .. }
        )
    }
}
