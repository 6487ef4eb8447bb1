//! Bulk export: drains the source directory into paginated page objects.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use idbridge_graph::{GraphClient, PageRequest, UserProfile};
use idbridge_store::ObjectStore;

use crate::config::ExportConfig;
use crate::summary::{ExecutionResult, RunSummary};
use crate::PipelineResult;

/// Key for an exported page, zero-padded so lexical sort is replay order.
#[must_use]
pub fn page_key(sequence: usize) -> String {
    format!("users_{sequence:06}.json")
}

/// Drains the source directory page by page into object storage.
pub struct ExportPipeline {
    client: Arc<GraphClient>,
    store: Arc<dyn ObjectStore>,
    config: ExportConfig,
}

impl ExportPipeline {
    pub fn new(
        client: Arc<GraphClient>,
        store: Arc<dyn ObjectStore>,
        config: ExportConfig,
    ) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self {
            client,
            store,
            config,
        })
    }

    /// Runs the export to completion, cancellation or first failure.
    ///
    /// A fetch or object write failure aborts the run; pages already written
    /// stay valid, and a later run skips keys that already exist.
    pub async fn run(&self, cancel: &CancellationToken) -> ExecutionResult {
        let mut summary = RunSummary::new();
        let outcome = self.run_inner(cancel, &mut summary).await;
        let metrics = self.client.metrics().await;
        summary.throttle_events = metrics.rate_limited_count as usize;
        summary.retry_events = metrics.retry_count as usize;
        match outcome {
            Ok(()) => {
                summary.finalize();
                summary.log_completion("export");
                ExecutionResult::completed(summary)
            }
            Err(error) => {
                warn!(%error, "Export aborted");
                ExecutionResult::aborted(summary, error.to_string())
            }
        }
    }

    async fn run_inner(
        &self,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> PipelineResult<()> {
        self.store.ensure_container(&self.config.container).await?;
        info!(
            container = %self.config.container,
            backend = self.store.backend_type(),
            page_size = self.config.page_size,
            "Starting export"
        );

        // Per-run dedup: the directory can repeat records across page
        // boundaries when the collection mutates mid-scan.
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut page_request = PageRequest {
            page_size: self.config.page_size,
            select_fields: self.config.select_fields.clone(),
            filter: None,
            page_token: None,
        };
        let mut sequence = 0usize;

        loop {
            if cancel.is_cancelled() {
                info!(pages = sequence, "Export cancelled");
                return Ok(());
            }

            let page = self.client.list_users(&page_request, cancel).await?;
            let fetched = page.users.len();
            let users: Vec<UserProfile> = page
                .users
                .into_iter()
                .filter(|u| self.matches_filter(u))
                .filter(|u| match &u.id {
                    Some(id) => seen_ids.insert(id.clone()),
                    None => true,
                })
                .collect();

            summary.total += users.len();
            let users = self.apply_cap(users, summary);

            if !users.is_empty() {
                self.write_page(sequence, &users).await?;
                summary.success += users.len();
                summary.units += 1;
                sequence += 1;
            }

            let capped = self
                .config
                .max_users
                .is_some_and(|cap| summary.success >= cap);
            if capped || page.next_page_token.is_none() {
                info!(pages = sequence, users = summary.success, "Export drained");
                return Ok(());
            }
            page_request.page_token = page.next_page_token;

            info!(
                page = sequence,
                fetched,
                exported = summary.success,
                "Exported page"
            );
            if let Some(delay) = self.config.inter_page_delay {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    fn matches_filter(&self, user: &UserProfile) -> bool {
        let Some(filter) = &self.config.name_filter else {
            return true;
        };
        let needle = filter.to_lowercase();
        let matches = |field: &Option<String>| {
            field
                .as_deref()
                .is_some_and(|v| v.to_lowercase().contains(&needle))
        };
        matches(&user.display_name) || matches(&user.user_principal_name)
    }

    fn apply_cap(&self, mut users: Vec<UserProfile>, summary: &mut RunSummary) -> Vec<UserProfile> {
        if let Some(cap) = self.config.max_users {
            let remaining = cap.saturating_sub(summary.success);
            if users.len() > remaining {
                summary.total -= users.len() - remaining;
                users.truncate(remaining);
            }
        }
        users
    }

    async fn write_page(&self, sequence: usize, users: &[UserProfile]) -> PipelineResult<()> {
        let key = page_key(sequence);
        if self.store.exists(&self.config.container, &key).await? {
            info!(key, "Page already exported, skipping write");
            return Ok(());
        }
        let bytes = serde_json::to_vec_pretty(users)?;
        self.store.write(&self.config.container, &key, &bytes).await?;
        Ok(())
    }
}
