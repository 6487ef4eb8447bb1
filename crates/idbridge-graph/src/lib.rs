//! Throttle-aware directory API client for idbridge.
//!
//! This crate owns the wire layer of the migration engine: paginated user
//! reads, single and batched writes, password patches, and the credential
//! pool that rotates 1..N app identities across distinct rate-limit buckets.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use idbridge_graph::{CredentialConfig, CredentialPool, GraphClient, TenantEndpoints};
//! use idbridge_store::EnvSecretStore;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = EnvSecretStore::new();
//! let pool = CredentialPool::new(
//!     &store,
//!     &[CredentialConfig {
//!         client_id: "app-client-id".into(),
//!         secret_name: "graph-client-secret-0".into(),
//!     }],
//!     TenantEndpoints::public_cloud("target.onmicrosoft.com"),
//! )
//! .await?;
//!
//! let client = GraphClient::new(Arc::new(pool), TenantEndpoints::public_cloud("target.onmicrosoft.com"))?;
//! let page = client
//!     .list_users(&Default::default(), &CancellationToken::new())
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod batch;
mod client;
mod credentials;
mod error;
mod metrics;
mod models;
mod retry;

pub use batch::{is_duplicate_conflict, WIRE_BATCH_CEILING};
pub use client::{GraphClient, ODataError, ODataResponse, PageRequest, UserPage};
pub use credentials::{AppCredential, CredentialConfig, CredentialPool, TenantEndpoints};
pub use error::{GraphError, GraphResult};
pub use metrics::ClientMetrics;
pub use models::{
    BatchItemFailure, BatchResult, ExtensionValue, Identity, PasswordProfile, UserProfile,
};
pub use retry::{is_retryable_status, parse_retry_after, RetryPolicy};
