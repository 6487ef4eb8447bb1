//! App credentials and the round-robin credential pool.
//!
//! Each app identity has an independent per-second quota on the directory
//! API, so rotating requests across N identities multiplies the effective
//! ceiling. A shared egress IP imposes an additional ceiling across all
//! identities it carries; operators spread instances across addresses to
//! avoid it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use idbridge_store::SecretStore;

use crate::{GraphError, GraphResult};

/// Endpoints of one directory tenant.
#[derive(Debug, Clone)]
pub struct TenantEndpoints {
    /// OAuth2 login authority base, e.g. `https://login.microsoftonline.com`.
    pub login_base: String,
    /// Directory API base, e.g. `https://graph.microsoft.com`.
    pub graph_base: String,
    /// Tenant id or default domain, e.g. `target.onmicrosoft.com`.
    pub tenant: String,
}

impl TenantEndpoints {
    /// Public-cloud endpoints for the given tenant.
    #[must_use]
    pub fn public_cloud(tenant: impl Into<String>) -> Self {
        Self {
            login_base: "https://login.microsoftonline.com".to_string(),
            graph_base: "https://graph.microsoft.com".to_string(),
            tenant: tenant.into(),
        }
    }

    /// The OAuth2 token endpoint for this tenant.
    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.login_base, self.tenant)
    }

    /// The default client-credentials scope for the directory API.
    #[must_use]
    pub fn default_scope(&self) -> String {
        format!("{}/.default", self.graph_base)
    }
}

/// One configured app identity: client id plus the logical name of its
/// secret in the secret store.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    pub client_id: String,
    pub secret_name: String,
}

/// OAuth2 token response from the authority.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Cached bearer token.
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_expired(&self, grace: chrono::Duration) -> bool {
        Utc::now() + grace >= self.expires_at
    }
}

/// A single app identity capable of producing bearer tokens.
///
/// Tokens are acquired with the client-credentials flow and cached until
/// shortly before expiry.
pub struct AppCredential {
    index: usize,
    client_id: String,
    client_secret: SecretString,
    endpoints: TenantEndpoints,
    http_client: reqwest::Client,
    cached_token: RwLock<Option<CachedToken>>,
    grace_period: chrono::Duration,
}

impl std::fmt::Debug for AppCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredential")
            .field("index", &self.index)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .finish()
    }
}

impl AppCredential {
    /// Position of this credential in the pool.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// The app's client id.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Gets a valid bearer token, refreshing if necessary.
    #[instrument(skip(self), fields(client_id = %self.client_id))]
    pub async fn get_token(&self) -> GraphResult<String> {
        {
            let cache = self.cached_token.read().await;
            if let Some(ref token) = *cache {
                if !token.is_expired(self.grace_period) {
                    debug!("Using cached token");
                    return Ok(token.access_token.clone());
                }
            }
        }

        debug!("Refreshing access token");
        let new_token = self.acquire_token().await?;

        {
            let mut cache = self.cached_token.write().await;
            *cache = Some(new_token.clone());
        }

        Ok(new_token.access_token)
    }

    /// Acquires a new token with the client-credentials flow.
    async fn acquire_token(&self) -> GraphResult<CachedToken> {
        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", &self.client_id),
            ("client_secret", self.client_secret.expose_secret()),
            ("scope", &self.endpoints.default_scope()),
        ];

        let response = self
            .http_client
            .post(self.endpoints.token_url())
            .form(&params)
            .send()
            .await
            .map_err(|e| GraphError::Auth(format!("Token request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(GraphError::Auth(format!(
                "Token request failed with status {status}: {body}"
            )));
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| GraphError::Auth(format!("Failed to parse token response: {e}")))?;

        Ok(CachedToken {
            access_token: token_response.access_token,
            expires_at: Utc::now() + chrono::Duration::seconds(token_response.expires_in),
        })
    }

    /// Invalidates the cached token, forcing a refresh on next use.
    pub async fn invalidate(&self) {
        let mut cache = self.cached_token.write().await;
        *cache = None;
    }
}

/// Round-robins 1..N app identities to spread load across distinct
/// rate-limit buckets.
///
/// Process-wide state: built once at pipeline start, read by every directory
/// client call. `report_throttled` is advisory; `next` prefers credentials
/// that are not inside a reported throttle window, falling back to plain
/// round-robin order when every credential is throttled.
#[derive(Debug)]
pub struct CredentialPool {
    credentials: Vec<Arc<AppCredential>>,
    cursor: AtomicUsize,
    throttled_until: RwLock<Vec<Option<Instant>>>,
}

impl CredentialPool {
    /// Builds the pool, resolving every client secret up front.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Config` if `configs` is empty or any secret
    /// cannot be resolved. This is a fatal startup error, never retried.
    pub async fn new(
        secret_store: &dyn SecretStore,
        configs: &[CredentialConfig],
        endpoints: TenantEndpoints,
    ) -> GraphResult<Self> {
        if configs.is_empty() {
            return Err(GraphError::Config(
                "At least one app credential must be configured".to_string(),
            ));
        }

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GraphError::Config(format!("Failed to create HTTP client: {e}")))?;

        let mut credentials = Vec::with_capacity(configs.len());
        for (index, config) in configs.iter().enumerate() {
            let secret = secret_store
                .get_secret(&config.secret_name)
                .await
                .map_err(|e| {
                    GraphError::Config(format!(
                        "Cannot resolve secret '{}' for client {}: {e}",
                        config.secret_name, config.client_id
                    ))
                })?;

            credentials.push(Arc::new(AppCredential {
                index,
                client_id: config.client_id.clone(),
                client_secret: secret,
                endpoints: endpoints.clone(),
                http_client: http_client.clone(),
                cached_token: RwLock::new(None),
                grace_period: chrono::Duration::minutes(5),
            }));
        }

        let slots = credentials.len();
        Ok(Self {
            credentials,
            cursor: AtomicUsize::new(0),
            throttled_until: RwLock::new(vec![None; slots]),
        })
    }

    /// Number of credentials in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Whether the pool is empty. Construction guarantees it never is.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Returns the credential at a fixed index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Arc<AppCredential>> {
        self.credentials.get(index).cloned()
    }

    /// Selects the next credential, round-robin, skipping credentials inside
    /// a reported throttle window when a clear one exists.
    pub async fn next(&self) -> Arc<AppCredential> {
        let start = self.cursor.fetch_add(1, Ordering::Relaxed);
        let n = self.credentials.len();
        let now = Instant::now();

        let throttled = self.throttled_until.read().await;
        for offset in 0..n {
            let idx = (start + offset) % n;
            let clear = match throttled[idx] {
                Some(until) => now >= until,
                None => true,
            };
            if clear {
                return Arc::clone(&self.credentials[idx]);
            }
        }

        // All throttled: keep rotating anyway so the retry pipeline can
        // honor the server's delay.
        Arc::clone(&self.credentials[start % n])
    }

    /// Advisory throttle report for a credential.
    ///
    /// With a single configured credential this has no routing effect.
    pub async fn report_throttled(&self, index: usize, retry_after_secs: u64) {
        let mut throttled = self.throttled_until.write().await;
        if let Some(slot) = throttled.get_mut(index) {
            *slot = Some(Instant::now() + Duration::from_secs(retry_after_secs));
            warn!(
                credential_index = index,
                retry_after_secs, "Credential throttled, deprioritizing"
            );
        }
    }
}
