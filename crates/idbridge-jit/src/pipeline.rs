//! The per-request JIT migration state machine.
//!
//! Fixed step order, fail-fast: parse, decrypt, reverse the UPN transform,
//! validate against the source directory, check target complexity. Every
//! failure degrades to a `Block` with a generic user-facing message; the
//! internal detail is logged under the request's correlation id. The
//! pipeline only signals intent — the directory service performs the actual
//! password write when it sees `MigratePassword`.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use idbridge_pipeline::{meets_complexity, reverse_upn};

use crate::envelope::CredentialDecryptor;
use crate::key_cache::PrivateKeyCache;
use crate::validator::CredentialValidator;
use crate::JitError;

/// Generic user-facing block title. Internal failure detail never leaks here.
pub const BLOCK_TITLE: &str = "Sign in blocked";
/// Generic user-facing block message.
pub const BLOCK_MESSAGE: &str = "We could not sign you in. Please try again later.";

/// Outcome of one JIT migration request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JitMigrationResult {
    /// Credential verified: adopt the submitted password in the target
    /// tenant and clear the migration flag.
    MigratePassword,
    /// Refuse the sign-in with a user-facing message.
    Block { title: String, message: String },
    /// The target tenant should prompt for a password update.
    UpdatePassword,
    /// Transient condition: the caller may retry the sign-in.
    Retry,
}

impl JitMigrationResult {
    fn block() -> Self {
        JitMigrationResult::Block {
            title: BLOCK_TITLE.to_string(),
            message: BLOCK_MESSAGE.to_string(),
        }
    }
}

/// One parsed sign-in event, decoupled from the HTTP wire shape.
#[derive(Default)]
pub struct SignInRequest {
    pub user_id: Option<String>,
    pub user_principal_name: Option<String>,
    pub correlation_id: Option<String>,
    /// Plaintext password from the test field.
    pub plaintext_password: Option<SecretString>,
    /// Plaintext-path nonce.
    pub nonce: Option<String>,
    /// Encrypted credential envelope.
    pub encrypted_envelope: Option<String>,
}

/// Pipeline response: the action plus the echoed nonce.
pub struct JitOutcome {
    pub result: JitMigrationResult,
    pub nonce: Option<String>,
}

/// JIT pipeline settings.
pub struct JitConfig {
    /// Source tenant domain restored by the reverse UPN transform.
    pub source_domain: String,
    /// Soft timeout on source-directory validation. The outer caller
    /// enforces a hard ~2s limit; aborting early returns a deliberate
    /// `Block` instead of letting the caller time out with no response.
    pub validation_timeout: Duration,
}

impl JitConfig {
    #[must_use]
    pub fn new(source_domain: impl Into<String>) -> Self {
        Self {
            source_domain: source_domain.into(),
            validation_timeout: Duration::from_millis(1500),
        }
    }
}

/// Serves JIT migration requests. Shared across concurrent requests; the
/// only mutable state is the key cache's first-load guard.
pub struct JitPipeline {
    config: JitConfig,
    key_cache: PrivateKeyCache,
    validator: Box<dyn CredentialValidator>,
}

impl JitPipeline {
    pub fn new(
        config: JitConfig,
        key_cache: PrivateKeyCache,
        validator: Box<dyn CredentialValidator>,
    ) -> Self {
        Self {
            config,
            key_cache,
            validator,
        }
    }

    /// Runs the state machine for one request. Never errors: every failure
    /// is a `Block` outcome.
    pub async fn handle(&self, request: SignInRequest, cancel: &CancellationToken) -> JitOutcome {
        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        match self.run_steps(&request, &correlation_id, cancel).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(correlation_id, %error, "JIT request blocked");
                JitOutcome {
                    result: JitMigrationResult::block(),
                    nonce: None,
                }
            }
        }
    }

    async fn run_steps(
        &self,
        request: &SignInRequest,
        correlation_id: &str,
        cancel: &CancellationToken,
    ) -> Result<JitOutcome, JitError> {
        let Some(upn) = request.user_principal_name.as_deref().filter(|u| !u.is_empty())
        else {
            return Err(JitError::Parse("Missing userPrincipalName".to_string()));
        };
        if request.user_id.as_deref().is_none_or(str::is_empty) {
            return Err(JitError::Parse("Missing user id".to_string()));
        }

        let (password, nonce) = self.extract_password(request).await?;
        if password.expose_secret().is_empty() {
            return Err(JitError::Parse("Empty password".to_string()));
        }

        let source_upn = reverse_upn(upn, &self.config.source_domain)
            .ok_or_else(|| JitError::Parse(format!("Cannot split principal name '{upn}'")))?;

        let validation = tokio::time::timeout(
            self.config.validation_timeout,
            self.validator.validate(&source_upn, &password, cancel),
        )
        .await;
        let valid = match validation {
            Ok(result) => result?,
            Err(_) => {
                return Err(JitError::ValidationTimeout {
                    elapsed_ms: self.config.validation_timeout.as_millis() as u64,
                })
            }
        };
        if !valid {
            return Err(JitError::ValidationFailed);
        }

        // The submitted password is adopted verbatim by the target tenant,
        // so it must satisfy the target's policy now.
        if !meets_complexity(password.expose_secret()) {
            return Err(JitError::ValidationFailed);
        }

        info!(correlation_id, "JIT migration approved");
        Ok(JitOutcome {
            result: JitMigrationResult::MigratePassword,
            nonce,
        })
    }

    /// Extracts the password from the plaintext test field or the encrypted
    /// envelope, along with the nonce to echo.
    async fn extract_password(
        &self,
        request: &SignInRequest,
    ) -> Result<(SecretString, Option<String>), JitError> {
        if let Some(ref password) = request.plaintext_password {
            return Ok((password.clone(), request.nonce.clone()));
        }
        let Some(ref envelope) = request.encrypted_envelope else {
            return Err(JitError::Parse("Missing password".to_string()));
        };

        let key = self.key_cache.get_or_load().await?;
        let payload = CredentialDecryptor::new(key).decrypt(envelope)?;
        Ok((payload.user_password, payload.nonce))
    }
}
