//! Per-batch audit records persisted by the import pipeline.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use idbridge_graph::BatchResult;
use idbridge_store::ObjectStore;

/// One user-level outcome inside an audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub user_principal_name: String,
    /// `created`, `skipped` or `failed`.
    pub outcome: String,
    /// API error detail for failed entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Audit record for one batch write, persisted regardless of batch outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportAuditLog {
    pub timestamp: DateTime<Utc>,
    /// Key of the exported page the batch came from.
    pub source_page: String,
    /// Zero-based batch sequence within the page.
    pub batch_sequence: usize,
    pub total: usize,
    pub success: usize,
    pub failure: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub entries: Vec<AuditEntry>,
}

impl ImportAuditLog {
    /// Builds an audit record from a batch outcome. `created_upns` are the
    /// UPNs submitted in the batch minus the skipped and failed ones.
    #[must_use]
    pub fn from_batch(
        source_page: &str,
        batch_sequence: usize,
        submitted_upns: &[String],
        result: &BatchResult,
        duration_ms: u64,
    ) -> Self {
        let failed: Vec<(&str, &str)> = result
            .failures
            .iter()
            .map(|f| (f.item_id.as_str(), f.message.as_str()))
            .collect();

        let mut entries = Vec::with_capacity(submitted_upns.len());
        for upn in submitted_upns {
            if result.skipped_ids.iter().any(|s| s == upn) {
                entries.push(AuditEntry {
                    user_principal_name: upn.clone(),
                    outcome: "skipped".to_string(),
                    detail: None,
                });
            } else if let Some((_, message)) = failed.iter().find(|(id, _)| id == upn) {
                entries.push(AuditEntry {
                    user_principal_name: upn.clone(),
                    outcome: "failed".to_string(),
                    detail: Some((*message).to_string()),
                });
            } else {
                entries.push(AuditEntry {
                    user_principal_name: upn.clone(),
                    outcome: "created".to_string(),
                    detail: None,
                });
            }
        }

        Self {
            timestamp: Utc::now(),
            source_page: source_page.to_string(),
            batch_sequence,
            total: result.total,
            success: result.success,
            failure: result.failure,
            skipped: result.skipped,
            duration_ms,
            entries,
        }
    }

    /// Object key for this record:
    /// `import-audit_{sourcePage}_batch{nnn}_{timestamp}.json`. The page key's
    /// `.json` suffix is stripped so keys stay single-extension.
    #[must_use]
    pub fn object_key(&self) -> String {
        let page = self.source_page.trim_end_matches(".json");
        format!(
            "import-audit_{}_batch{:03}_{}.json",
            page,
            self.batch_sequence,
            self.timestamp.format("%Y%m%dT%H%M%S%3fZ")
        )
    }

    /// Persists the record. Write-once; audit failures never fail the run,
    /// they are logged and swallowed.
    pub async fn persist(&self, store: &Arc<dyn ObjectStore>, container: &str) {
        let key = self.object_key();
        let bytes = match serde_json::to_vec_pretty(self) {
            Ok(bytes) => bytes,
            Err(error) => {
                warn!(key, %error, "Failed to serialize audit record");
                return;
            }
        };
        if let Err(error) = store.write(container, &key, &bytes).await {
            warn!(key, %error, "Failed to persist audit record");
        }
    }
}
