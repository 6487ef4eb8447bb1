//! Error types for the JIT migration handler.
//!
//! These errors never reach the end user: the pipeline degrades every one of
//! them to a `Block` outcome with a generic message, logging the detail under
//! the request's correlation id.

use thiserror::Error;

/// Result type alias using `JitError`.
pub type JitResult<T> = Result<T, JitError>;

/// Internal failure modes of the JIT handler.
#[derive(Debug, Error)]
pub enum JitError {
    /// Configuration error, fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The inbound event payload is missing a required field.
    #[error("Malformed sign-in event: {0}")]
    Parse(String),

    /// The encrypted envelope could not be decoded or decrypted.
    #[error("Envelope error: {0}")]
    Envelope(String),

    /// The private key could not be loaded or parsed.
    #[error("Key error: {0}")]
    Key(String),

    /// Source-directory credential validation failed or errored.
    #[error("Credential validation failed")]
    ValidationFailed,

    /// Source-directory validation exceeded the soft timeout.
    #[error("Credential validation timed out after {elapsed_ms}ms")]
    ValidationTimeout { elapsed_ms: u64 },
}
