//! Encrypted credential envelope.
//!
//! The sign-in event carries the submitted password inside a nested
//! envelope: the outer layer is base64url-encoded RSA-OAEP(SHA-256)
//! ciphertext under the service key; the recovered plaintext is a compact
//! `alg: none` token (`header.payload.`) whose JSON body carries
//! `user-password` and `nonce`.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use secrecy::SecretString;
use serde_json::Value;

use crate::{JitError, JitResult};

/// Decrypted contents of a credential envelope.
pub struct InnerPayload {
    /// The password the user submitted at the sign-in page.
    pub user_password: SecretString,
    /// Replay-protection nonce, echoed back to the caller.
    pub nonce: Option<String>,
}

/// Decrypts credential envelopes under one RSA private key.
///
/// Holds a shared handle to the cached key; constructing a decryptor per
/// request never copies the key material.
pub struct CredentialDecryptor {
    key: Arc<RsaPrivateKey>,
}

impl CredentialDecryptor {
    #[must_use]
    pub fn new(key: Arc<RsaPrivateKey>) -> Self {
        Self { key }
    }

    /// Decrypts an envelope and parses the inner token.
    ///
    /// # Errors
    ///
    /// Returns `JitError::Envelope` for any structural or cryptographic
    /// failure: bad base64, OAEP failure, malformed inner token, or an
    /// inner algorithm other than `none`.
    pub fn decrypt(&self, envelope: &str) -> JitResult<InnerPayload> {
        let ciphertext = URL_SAFE_NO_PAD
            .decode(envelope.trim())
            .map_err(|e| JitError::Envelope(format!("Envelope is not valid base64url: {e}")))?;

        let plaintext = self
            .key
            .decrypt(Oaep::new::<sha2::Sha256>(), &ciphertext)
            .map_err(|e| JitError::Envelope(format!("OAEP decryption failed: {e}")))?;

        let token = String::from_utf8(plaintext)
            .map_err(|_| JitError::Envelope("Inner token is not UTF-8".to_string()))?;
        parse_inner_token(&token)
    }
}

/// Parses a compact `alg: none` token into the inner payload.
fn parse_inner_token(token: &str) -> JitResult<InnerPayload> {
    let mut parts = token.split('.');
    let (header, payload) = match (parts.next(), parts.next()) {
        (Some(h), Some(p)) => (h, p),
        _ => return Err(JitError::Envelope("Inner token is not compact form".to_string())),
    };

    let header: Value = decode_json_part(header, "header")?;
    match header.get("alg").and_then(Value::as_str) {
        Some("none") => {}
        other => {
            return Err(JitError::Envelope(format!(
                "Unexpected inner token algorithm: {other:?}"
            )))
        }
    }

    let body: Value = decode_json_part(payload, "payload")?;
    let password = body
        .get("user-password")
        .and_then(Value::as_str)
        .ok_or_else(|| JitError::Envelope("Inner payload lacks user-password".to_string()))?;
    let nonce = body.get("nonce").and_then(Value::as_str).map(str::to_string);

    Ok(InnerPayload {
        user_password: SecretString::new(password.to_string()),
        nonce,
    })
}

fn decode_json_part(part: &str, what: &str) -> JitResult<Value> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|e| JitError::Envelope(format!("Inner token {what} is not base64url: {e}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| JitError::Envelope(format!("Inner token {what} is not JSON: {e}")))
}

/// Builds an envelope for a password and nonce under a public key.
///
/// Counterpart of [`CredentialDecryptor::decrypt`], used by tests and local
/// tooling; the production encryptor lives with the sign-in page.
pub fn encrypt_envelope(
    public_key: &RsaPublicKey,
    password: &str,
    nonce: Option<&str>,
) -> JitResult<String> {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let mut body = serde_json::Map::new();
    body.insert("user-password".to_string(), Value::from(password));
    if let Some(nonce) = nonce {
        body.insert("nonce".to_string(), Value::from(nonce));
    }
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::to_vec(&Value::Object(body)).map_err(|e| JitError::Envelope(e.to_string()))?,
    );
    let token = format!("{header}.{payload}.");

    let ciphertext = public_key
        .encrypt(
            &mut rand::thread_rng(),
            Oaep::new::<sha2::Sha256>(),
            token.as_bytes(),
        )
        .map_err(|e| JitError::Envelope(format!("OAEP encryption failed: {e}")))?;
    Ok(URL_SAFE_NO_PAD.encode(ciphertext))
}
