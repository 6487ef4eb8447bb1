//! Error types for storage backends.

use thiserror::Error;

/// Result type alias using `StoreError`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by object store and secret store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object or secret not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend configuration error (bad root path, unmapped secret name).
    #[error("Store configuration error: {0}")]
    Config(String),

    /// Value exists but is not usable (wrong encoding, empty).
    #[error("Invalid value for '{name}': {detail}")]
    InvalidValue { name: String, detail: String },
}
