//! Object storage and secret store abstractions for idbridge.
//!
//! The migration pipelines consume storage strictly through the
//! [`ObjectStore`] and [`SecretStore`] traits so that the production
//! backends (blob storage, a managed vault) can be swapped for the local
//! filesystem and environment variables during development and testing.

mod error;
mod object;
mod secret;

pub use error::{StoreError, StoreResult};
pub use object::{FsObjectStore, MemoryObjectStore, ObjectStore};
pub use secret::{EnvSecretStore, InlineSecretStore, SecretStore};
