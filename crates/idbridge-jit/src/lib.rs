//! Just-in-time credential migration handler.
//!
//! Serves sign-in events from the target directory: decrypts the submitted
//! credential envelope, reverses the import UPN transform, validates the
//! credential against the source directory, and answers with an action
//! (`MigratePassword` on success, `Block` on any failure) within the
//! caller's ~2s budget.

pub mod envelope;
pub mod error;
pub mod http;
pub mod key_cache;
pub mod pipeline;
pub mod validator;

pub use envelope::{encrypt_envelope, CredentialDecryptor, InnerPayload};
pub use error::{JitError, JitResult};
pub use http::router;
pub use key_cache::PrivateKeyCache;
pub use pipeline::{JitConfig, JitMigrationResult, JitOutcome, JitPipeline, SignInRequest};
pub use validator::{
    build_validator, CredentialValidator, RopcValidator, TestModeValidator, ValidatorConfig,
};
