//! Error types for the export and import pipelines.

use thiserror::Error;

/// Result type alias using `PipelineError`.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur while running a migration pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration validation error, fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Directory API failure that exhausted the retry pipeline.
    #[error(transparent)]
    Graph(#[from] idbridge_graph::GraphError),

    /// Object storage failure.
    #[error(transparent)]
    Store(#[from] idbridge_store::StoreError),

    /// Page serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The run was cancelled by the caller.
    #[error("Pipeline cancelled")]
    Cancelled,
}
