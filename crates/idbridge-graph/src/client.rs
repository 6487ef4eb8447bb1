//! Throttle-aware directory API client.
//!
//! All operations run through one retry pipeline: exponential backoff with
//! jitter, a `Retry-After` override, a bounded per-operation timeout, and
//! cooperative cancellation. 429s are additionally reported to the
//! credential pool so rotation can steer around a throttled identity.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::batch::{
    classify_responses, BatchEnvelope, BatchResponseEnvelope, BatchSubRequest, WIRE_BATCH_CEILING,
};
use crate::credentials::{CredentialPool, TenantEndpoints};
use crate::metrics::ClientMetrics;
use crate::models::{BatchResult, PasswordProfile, UserProfile};
use crate::retry::{is_retryable_status, parse_retry_after, RetryPolicy};
use crate::{GraphError, GraphResult};

/// `OData` error response from the directory API.
#[derive(Debug, Deserialize)]
pub struct ODataError {
    pub error: ODataErrorBody,
}

/// `OData` error body.
#[derive(Debug, Deserialize)]
pub struct ODataErrorBody {
    pub code: String,
    pub message: String,
}

/// Response wrapper for paginated directory API responses.
#[derive(Debug, Deserialize)]
pub struct ODataResponse<T> {
    pub value: Vec<T>,
    #[serde(rename = "@odata.nextLink")]
    pub next_link: Option<String>,
}

/// One page request against the users collection.
#[derive(Debug, Clone, Default)]
pub struct PageRequest {
    /// `$top` page size.
    pub page_size: usize,
    /// `$select` field projection; full records when empty.
    pub select_fields: Vec<String>,
    /// `$filter` expression, already in the API's grammar.
    pub filter: Option<String>,
    /// Opaque continuation token from a previous page.
    pub page_token: Option<String>,
}

/// One page of user records.
#[derive(Debug)]
pub struct UserPage {
    pub users: Vec<UserProfile>,
    /// Opaque token for the next page; `None` when exhausted.
    pub next_page_token: Option<String>,
}

/// Directory API client bound to one tenant and one credential pool.
#[derive(Debug)]
pub struct GraphClient {
    http_client: reqwest::Client,
    pool: Arc<CredentialPool>,
    endpoints: TenantEndpoints,
    api_version: String,
    policy: RetryPolicy,
    metrics: Arc<RwLock<ClientMetrics>>,
}

impl GraphClient {
    /// Creates a client with the default retry policy.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Config` if the HTTP client cannot be created.
    pub fn new(pool: Arc<CredentialPool>, endpoints: TenantEndpoints) -> GraphResult<Self> {
        Self::with_policy(pool, endpoints, RetryPolicy::default())
    }

    /// Creates a client with a custom retry policy.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::Config` if the policy is invalid or the HTTP
    /// client cannot be created.
    pub fn with_policy(
        pool: Arc<CredentialPool>,
        endpoints: TenantEndpoints,
        policy: RetryPolicy,
    ) -> GraphResult<Self> {
        policy
            .validate()
            .map_err(|e| GraphError::Config(format!("Invalid retry policy: {e}")))?;

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| GraphError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http_client,
            pool,
            endpoints,
            api_version: "v1.0".to_string(),
            policy,
            metrics: Arc::new(RwLock::new(ClientMetrics::new())),
        })
    }

    /// The base URL for directory API requests.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}/{}", self.endpoints.graph_base, self.api_version)
    }

    /// Snapshot of client metrics.
    pub async fn metrics(&self) -> ClientMetrics {
        self.metrics.read().await.clone()
    }

    /// The credential pool this client rotates over.
    #[must_use]
    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    // ── operations ──────────────────────────────────────────────────────

    /// Fetches one page of users.
    ///
    /// Pagination is cursor-based: pass the returned `next_page_token` back
    /// in the next request until it comes back `None`.
    #[instrument(skip(self, cancel), fields(page_size = page.page_size))]
    pub async fn list_users(
        &self,
        page: &PageRequest,
        cancel: &CancellationToken,
    ) -> GraphResult<UserPage> {
        let url = match &page.page_token {
            Some(token) => token.clone(),
            None => {
                let mut url = format!("{}/users?$top={}", self.base_url(), page.page_size);
                if !page.select_fields.is_empty() {
                    url.push_str("&$select=");
                    url.push_str(&page.select_fields.join(","));
                }
                if let Some(ref filter) = page.filter {
                    url.push_str("&$filter=");
                    url.push_str(&urlencoding::encode(filter));
                }
                url
            }
        };

        let response: ODataResponse<UserProfile> =
            self.request(reqwest::Method::GET, &url, None, cancel).await?;

        debug!(count = response.value.len(), "Fetched user page");

        Ok(UserPage {
            users: response.value,
            next_page_token: response.next_link,
        })
    }

    /// Creates a single user.
    #[instrument(skip(self, profile, cancel), fields(upn = %profile.log_name()))]
    pub async fn create_user(
        &self,
        profile: &UserProfile,
        cancel: &CancellationToken,
    ) -> GraphResult<UserProfile> {
        let url = format!("{}/users", self.base_url());
        let body = serde_json::to_value(profile)?;
        self.request(reqwest::Method::POST, &url, Some(body), cancel)
            .await
    }

    /// Creates users in bounded wire batches.
    ///
    /// The caller may pass any number of profiles; they are chunked at the
    /// API's 20-sub-request ceiling internally and the per-chunk results are
    /// merged. Duplicate conflicts are classified as skips, never failures.
    #[instrument(skip(self, profiles, cancel), fields(count = profiles.len()))]
    pub async fn create_users_batch(
        &self,
        profiles: &[UserProfile],
        cancel: &CancellationToken,
    ) -> GraphResult<BatchResult> {
        let mut result = BatchResult::default();

        for chunk in profiles.chunks(WIRE_BATCH_CEILING) {
            let requests: Vec<BatchSubRequest> = chunk
                .iter()
                .enumerate()
                .map(|(i, profile)| {
                    Ok(BatchSubRequest::post(
                        i,
                        "/users",
                        serde_json::to_value(profile)?,
                    ))
                })
                .collect::<Result<_, serde_json::Error>>()?;

            let url = format!("{}/$batch", self.base_url());
            let envelope: BatchResponseEnvelope = self
                .request(
                    reqwest::Method::POST,
                    &url,
                    Some(serde_json::to_value(BatchEnvelope { requests })?),
                    cancel,
                )
                .await?;

            let chunk_result = classify_responses(chunk, envelope);
            if chunk_result.throttled {
                warn!(
                    retry_after = ?chunk_result.retry_after,
                    "Batch chunk contained throttled sub-responses"
                );
            }
            result.merge(chunk_result);
        }

        Ok(result)
    }

    /// Applies a partial update to a user.
    #[instrument(skip(self, fields, cancel))]
    pub async fn update_user(
        &self,
        id: &str,
        fields: serde_json::Map<String, Value>,
        cancel: &CancellationToken,
    ) -> GraphResult<()> {
        let url = format!("{}/users/{}", self.base_url(), urlencoding::encode(id));
        let _: Value = self
            .request(reqwest::Method::PATCH, &url, Some(Value::Object(fields)), cancel)
            .await?;
        Ok(())
    }

    /// Fetches a user by object id or UPN. Returns `None` for 404.
    #[instrument(skip(self, cancel))]
    pub async fn get_user_by_id(
        &self,
        id: &str,
        select_fields: &[String],
        cancel: &CancellationToken,
    ) -> GraphResult<Option<UserProfile>> {
        // Ids may be UPNs; `#` or `@` in the segment must not reach the URL
        // parser raw, or everything after a `#` is dropped as a fragment.
        let mut url = format!("{}/users/{}", self.base_url(), urlencoding::encode(id));
        if !select_fields.is_empty() {
            url.push_str("?$select=");
            url.push_str(&select_fields.join(","));
        }

        match self.request(reqwest::Method::GET, &url, None, cancel).await {
            Ok(profile) => Ok(Some(profile)),
            Err(GraphError::Api { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Finds a single user by an extension attribute value.
    ///
    /// The filter is a single-match query; when multiple users match, the
    /// first returned wins.
    #[instrument(skip(self, cancel))]
    pub async fn find_user_by_extension_attribute(
        &self,
        name: &str,
        value: &str,
        cancel: &CancellationToken,
    ) -> GraphResult<Option<UserProfile>> {
        // Single quotes in OData literals are escaped by doubling.
        let literal = value.replace('\'', "''");
        let filter = format!("{name} eq '{literal}'");
        let url = format!(
            "{}/users?$filter={}&$top=1",
            self.base_url(),
            urlencoding::encode(&filter)
        );

        let response: ODataResponse<UserProfile> =
            self.request(reqwest::Method::GET, &url, None, cancel).await?;
        Ok(response.value.into_iter().next())
    }

    /// Sets a user's password via a password-profile patch.
    #[instrument(skip(self, password, cancel))]
    pub async fn set_password(
        &self,
        id: &str,
        password: &str,
        force_change: bool,
        cancel: &CancellationToken,
    ) -> GraphResult<()> {
        let mut fields = serde_json::Map::new();
        fields.insert(
            "passwordProfile".to_string(),
            serde_json::to_value(PasswordProfile {
                password: password.to_string(),
                force_change_password_next_sign_in: force_change,
            })?,
        );
        self.update_user(id, fields, cancel).await
    }

    // ── retry pipeline ──────────────────────────────────────────────────

    /// Executes one request through the retry pipeline, bounded by the
    /// per-operation timeout.
    async fn request<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<Value>,
        cancel: &CancellationToken,
    ) -> GraphResult<T> {
        let operation = self.request_inner(method, url, body, cancel);
        match tokio::time::timeout(self.policy.operation_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(GraphError::Timeout {
                elapsed_ms: self.policy.operation_timeout.as_millis() as u64,
            }),
        }
    }

    async fn request_inner<T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<Value>,
        cancel: &CancellationToken,
    ) -> GraphResult<T> {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(GraphError::Cancelled);
            }

            let credential = self.pool.next().await;
            let token = credential.get_token().await?;

            let mut request = self
                .http_client
                .request(method.clone(), url)
                .bearer_auth(&token);
            if let Some(ref b) = body {
                request = request.json(b);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    // Transport failure: retryable.
                    if attempt + 1 >= self.policy.max_attempts {
                        return Err(GraphError::Http(e));
                    }
                    warn!(error = %e, attempt, "Transport error, retrying");
                    self.sleep_before_retry(attempt, None, cancel).await?;
                    attempt += 1;
                    continue;
                }
            };

            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after);

                {
                    let mut metrics = self.metrics.write().await;
                    metrics.record_rate_limited();
                }
                self.pool
                    .report_throttled(credential.index(), retry_after.unwrap_or(1))
                    .await;

                if attempt + 1 >= self.policy.max_attempts {
                    return Err(GraphError::MaxRetriesExceeded {
                        attempts: self.policy.max_attempts,
                    });
                }
                warn!(attempt, ?retry_after, "Rate limited, backing off");
                self.sleep_before_retry(attempt, retry_after, cancel).await?;
                attempt += 1;
                continue;
            }

            if is_retryable_status(status.as_u16()) {
                {
                    let mut metrics = self.metrics.write().await;
                    metrics.record_transient_error();
                }
                if attempt + 1 >= self.policy.max_attempts {
                    return Err(GraphError::MaxRetriesExceeded {
                        attempts: self.policy.max_attempts,
                    });
                }
                warn!(status = status.as_u16(), attempt, "Transient error, retrying");
                self.sleep_before_retry(attempt, None, cancel).await?;
                attempt += 1;
                continue;
            }

            if status.is_success() {
                {
                    let mut metrics = self.metrics.write().await;
                    metrics.record_success();
                }
                // 204 No Content and empty bodies deserialize as null.
                let bytes = response.bytes().await?;
                let value: Value = if bytes.is_empty() {
                    Value::Null
                } else {
                    serde_json::from_slice(&bytes)?
                };
                return Ok(serde_json::from_value(value)?);
            }

            // Non-retryable error: surface immediately with OData detail.
            let status_code = status.as_u16();
            let error_body = response.text().await.unwrap_or_default();
            if let Ok(odata) = serde_json::from_str::<ODataError>(&error_body) {
                return Err(GraphError::Api {
                    code: odata.error.code,
                    message: odata.error.message,
                    status: status_code,
                });
            }
            return Err(GraphError::Api {
                code: status.to_string(),
                message: error_body,
                status: status_code,
            });
        }
    }

    /// Sleeps before a retry, aborting early on cancellation.
    async fn sleep_before_retry(
        &self,
        attempt: u32,
        retry_after_secs: Option<u64>,
        cancel: &CancellationToken,
    ) -> GraphResult<()> {
        let delay = self.policy.retry_delay(attempt, retry_after_secs);
        tokio::select! {
            () = cancel.cancelled() => return Err(GraphError::Cancelled),
            () = tokio::time::sleep(delay) => {}
        }
        let mut metrics = self.metrics.write().await;
        metrics.record_retry();
        Ok(())
    }
}
