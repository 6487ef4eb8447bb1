//! Process-lifetime cache for the envelope decryption key.
//!
//! The JIT handler sits on the sign-in hot path with a ~2s budget; a
//! secret-store round trip per request would eat most of it. The key is
//! loaded and parsed once, behind a mutex so concurrent first requests do
//! not trigger duplicate secret-store calls.

use std::sync::Arc;

use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::RsaPrivateKey;
use secrecy::ExposeSecret;
use tokio::sync::Mutex;
use tracing::{debug, info};

use idbridge_store::SecretStore;

use crate::{JitError, JitResult};

/// Lazily-loaded, process-lifetime RSA private key.
pub struct PrivateKeyCache {
    store: Arc<dyn SecretStore>,
    secret_name: String,
    cached: Mutex<Option<Arc<RsaPrivateKey>>>,
}

impl PrivateKeyCache {
    pub fn new(store: Arc<dyn SecretStore>, secret_name: impl Into<String>) -> Self {
        Self {
            store,
            secret_name: secret_name.into(),
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached key, loading and parsing it on first use.
    ///
    /// # Errors
    ///
    /// Returns `JitError::Key` when the secret is missing or does not parse
    /// as a PEM private key. This is a configuration error; callers treat it
    /// as fatal at first use.
    pub async fn get_or_load(&self) -> JitResult<Arc<RsaPrivateKey>> {
        let mut cached = self.cached.lock().await;
        if let Some(ref key) = *cached {
            debug!("Using cached private key");
            return Ok(Arc::clone(key));
        }

        info!(secret = %self.secret_name, "Loading envelope private key");
        let pem = self
            .store
            .get_secret(&self.secret_name)
            .await
            .map_err(|e| JitError::Key(format!("Cannot load key '{}': {e}", self.secret_name)))?;

        let key = Arc::new(parse_private_key_pem(pem.expose_secret())?);
        *cached = Some(Arc::clone(&key));
        Ok(key)
    }

    /// Drops the cached key, forcing a reload on next use. Rotation hook.
    pub async fn invalidate(&self) {
        let mut cached = self.cached.lock().await;
        *cached = None;
    }
}

/// Parses a PEM private key, accepting both PKCS#8 and PKCS#1 framing.
fn parse_private_key_pem(pem: &str) -> JitResult<RsaPrivateKey> {
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| JitError::Key(format!("Private key is not valid PEM: {e}")))
}
