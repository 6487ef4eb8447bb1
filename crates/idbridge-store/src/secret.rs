//! Secret store contract and local implementations.

use std::collections::HashMap;

use async_trait::async_trait;
use secrecy::SecretString;

use crate::{StoreError, StoreResult};

/// Resolves logical secret names to values.
///
/// The credential pool and the JIT private-key cache are the only consumers;
/// both resolve their secrets once at startup or first use and never per
/// request.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Retrieves a secret by its logical name.
    ///
    /// Returns `StoreError::NotFound` if the secret does not exist.
    async fn get_secret(&self, name: &str) -> StoreResult<SecretString>;

    /// Backend name for logging and diagnostics.
    fn backend_type(&self) -> &'static str;
}

/// Environment-variable backed secret store.
///
/// Logical names are mangled to environment convention: dashes become
/// underscores and the name is upper-cased (`graph-client-secret-1` reads
/// `GRAPH_CLIENT_SECRET_1`).
#[derive(Debug, Default)]
pub struct EnvSecretStore;

impl EnvSecretStore {
    /// Creates an environment-backed store.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn env_name(name: &str) -> String {
        name.replace('-', "_").to_uppercase()
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> StoreResult<SecretString> {
        let var = Self::env_name(name);
        match std::env::var(&var) {
            Ok(value) if !value.is_empty() => Ok(SecretString::new(value)),
            Ok(_) => Err(StoreError::InvalidValue {
                name: name.to_string(),
                detail: format!("Environment variable {var} is empty"),
            }),
            Err(_) => Err(StoreError::NotFound(name.to_string())),
        }
    }

    fn backend_type(&self) -> &'static str {
        "env"
    }
}

/// In-memory secret store for tests and local development.
#[derive(Debug, Default)]
pub struct InlineSecretStore {
    secrets: HashMap<String, String>,
}

impl InlineSecretStore {
    /// Creates an empty inline store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a secret, builder-style.
    #[must_use]
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), value.into());
        self
    }
}

#[async_trait]
impl SecretStore for InlineSecretStore {
    async fn get_secret(&self, name: &str) -> StoreResult<SecretString> {
        self.secrets
            .get(name)
            .map(|v| SecretString::new(v.clone()))
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn backend_type(&self) -> &'static str {
        "inline"
    }
}
