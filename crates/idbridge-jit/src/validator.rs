//! Legacy credential validation against the source directory.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use idbridge_graph::TenantEndpoints;

use crate::{JitError, JitResult};

/// Validates a user's source-tenant credential.
#[async_trait]
pub trait CredentialValidator: Send + Sync {
    /// Returns whether the credential is valid. Never reveals which half of
    /// username/password was wrong.
    async fn validate(
        &self,
        upn: &str,
        password: &SecretString,
        cancel: &CancellationToken,
    ) -> JitResult<bool>;
}

impl std::fmt::Debug for dyn CredentialValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CredentialValidator")
    }
}

/// Validator settings.
#[derive(Debug, Clone)]
pub struct ValidatorConfig {
    /// App registration used for the password grant.
    pub client_id: String,
    /// Accept every credential without calling the source directory.
    pub test_mode: bool,
    /// Whether this deployment is production. Test mode is refused here.
    pub production: bool,
}

/// Builds the configured validator.
///
/// # Errors
///
/// Returns `JitError::Config` when test mode is enabled in a production
/// deployment.
pub fn build_validator(
    config: &ValidatorConfig,
    endpoints: TenantEndpoints,
) -> JitResult<Box<dyn CredentialValidator>> {
    if config.test_mode {
        if config.production {
            error!("Test-mode credential bypass enabled in a production deployment, refusing");
            return Err(JitError::Config(
                "test_mode must not be enabled in production".to_string(),
            ));
        }
        warn!("Credential validation is in TEST MODE, every password is accepted");
        return Ok(Box::new(TestModeValidator));
    }
    Ok(Box::new(RopcValidator::new(
        endpoints,
        config.client_id.clone(),
    )?))
}

/// Resource-owner password-grant validator.
///
/// Exchanges the submitted credential for a token directly against the
/// source tenant, scoped minimally to `openid`. A 2xx response means the
/// credential is valid; everything else means it is not.
pub struct RopcValidator {
    http_client: reqwest::Client,
    endpoints: TenantEndpoints,
    client_id: String,
}

impl RopcValidator {
    pub fn new(endpoints: TenantEndpoints, client_id: String) -> JitResult<Self> {
        if client_id.is_empty() {
            return Err(JitError::Config(
                "validator client_id must be configured".to_string(),
            ));
        }
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| JitError::Config(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            http_client,
            endpoints,
            client_id,
        })
    }
}

#[async_trait]
impl CredentialValidator for RopcValidator {
    async fn validate(
        &self,
        upn: &str,
        password: &SecretString,
        cancel: &CancellationToken,
    ) -> JitResult<bool> {
        let params = [
            ("grant_type", "password"),
            ("client_id", &self.client_id),
            ("username", upn),
            ("password", password.expose_secret()),
            ("scope", "openid"),
        ];

        let send = self.http_client.post(self.endpoints.token_url()).form(&params).send();
        let response = tokio::select! {
            () = cancel.cancelled() => return Ok(false),
            response = send => response,
        };

        match response {
            Ok(response) => {
                let valid = response.status().is_success();
                debug!(valid, "Source-directory credential check complete");
                Ok(valid)
            }
            Err(error) => {
                // Transport failure is indistinguishable from a bad
                // credential to the end user; only operators see the detail.
                warn!(%error, "Source-directory credential check errored");
                Ok(false)
            }
        }
    }
}

/// Accepts every credential. Local development only.
pub struct TestModeValidator;

#[async_trait]
impl CredentialValidator for TestModeValidator {
    async fn validate(
        &self,
        upn: &str,
        _password: &SecretString,
        _cancel: &CancellationToken,
    ) -> JitResult<bool> {
        warn!(upn, "Test-mode validator accepted credential without checking");
        Ok(true)
    }
}
