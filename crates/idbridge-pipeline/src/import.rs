//! Bulk import: replays exported pages into the target directory.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Map;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use idbridge_graph::{BatchResult, GraphClient, UserProfile};
use idbridge_store::ObjectStore;

use crate::audit::ImportAuditLog;
use crate::config::ImportConfig;
use crate::summary::{ExecutionResult, RunSummary};
use crate::transform::UserTransformer;
use crate::{PipelineError, PipelineResult};

/// Replays exported pages into the target tenant in bounded batches.
pub struct ImportPipeline {
    client: Arc<GraphClient>,
    store: Arc<dyn ObjectStore>,
    config: ImportConfig,
    transformer: UserTransformer,
}

impl ImportPipeline {
    pub fn new(
        client: Arc<GraphClient>,
        store: Arc<dyn ObjectStore>,
        config: ImportConfig,
    ) -> PipelineResult<Self> {
        config.validate()?;
        let transformer = UserTransformer::new(config.clone());
        Ok(Self {
            client,
            store,
            config,
            transformer,
        })
    }

    /// Runs the import to completion or cancellation.
    ///
    /// A failed batch counts its records as failures and the run continues
    /// with the next unit of work; only unreadable storage aborts the run.
    pub async fn run(&self, cancel: &CancellationToken) -> ExecutionResult {
        let mut summary = RunSummary::new();
        let outcome = self.run_inner(cancel, &mut summary).await;
        let metrics = self.client.metrics().await;
        summary.throttle_events = metrics.rate_limited_count as usize;
        summary.retry_events = metrics.retry_count as usize;
        match outcome {
            Ok(()) => {
                summary.finalize();
                summary.log_completion("import");
                ExecutionResult::completed(summary)
            }
            Err(error) => {
                warn!(%error, "Import aborted");
                ExecutionResult::aborted(summary, error.to_string())
            }
        }
    }

    async fn run_inner(
        &self,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> PipelineResult<()> {
        let pages = self
            .store
            .list(&self.config.container, Some("users_"))
            .await?;
        info!(
            container = %self.config.container,
            backend = self.store.backend_type(),
            pages = pages.len(),
            batch_size = self.config.batch_size,
            "Starting import"
        );

        for page_key in &pages {
            if cancel.is_cancelled() {
                info!("Import cancelled");
                return Ok(());
            }
            self.import_page(page_key, cancel, summary).await?;
        }
        Ok(())
    }

    async fn import_page(
        &self,
        page_key: &str,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> PipelineResult<()> {
        let bytes = self.store.read(&self.config.container, page_key).await?;
        let users: Vec<UserProfile> = serde_json::from_slice(&bytes)?;
        info!(page = page_key, users = users.len(), "Importing page");

        let transformed: Vec<UserProfile> = users
            .into_iter()
            .map(|u| self.transformer.transform(u))
            .collect();

        for (sequence, batch) in transformed.chunks(self.config.batch_size).enumerate() {
            if cancel.is_cancelled() {
                info!(page = page_key, "Import cancelled mid-page");
                return Ok(());
            }
            self.import_batch(page_key, sequence, batch, cancel, summary)
                .await;

            if let Some(delay) = self.config.inter_batch_delay {
                tokio::select! {
                    () = cancel.cancelled() => {}
                    () = tokio::time::sleep(delay) => {}
                }
            }
        }
        Ok(())
    }

    /// Writes one batch and persists its audit record. Batch failures are
    /// absorbed into the summary, never propagated.
    async fn import_batch(
        &self,
        page_key: &str,
        sequence: usize,
        batch: &[UserProfile],
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) {
        let started = Instant::now();
        let submitted_upns: Vec<String> = batch
            .iter()
            .map(|u| u.user_principal_name.clone().unwrap_or_default())
            .collect();

        summary.total += batch.len();
        summary.units += 1;

        let result = match self.client.create_users_batch(batch, cancel).await {
            Ok(result) => result,
            Err(error) => {
                // Retry pipeline exhausted for the whole batch.
                warn!(page = page_key, batch = sequence, %error, "Batch write failed");
                summary.failure += batch.len();
                let failed = BatchResult {
                    total: batch.len(),
                    failure: batch.len(),
                    failures: batch
                        .iter()
                        .enumerate()
                        .map(|(index, u)| idbridge_graph::BatchItemFailure {
                            index,
                            item_id: u.log_name().to_string(),
                            status: 0,
                            message: error.to_string(),
                        })
                        .collect(),
                    ..Default::default()
                };
                let audit = ImportAuditLog::from_batch(
                    page_key,
                    sequence,
                    &submitted_upns,
                    &failed,
                    started.elapsed().as_millis() as u64,
                );
                audit.persist(&self.store, &self.config.container).await;
                return;
            }
        };

        summary.success += result.success;
        summary.failure += result.failure;
        summary.skipped += result.skipped;
        info!(
            page = page_key,
            batch = sequence,
            success = result.success,
            failure = result.failure,
            skipped = result.skipped,
            throttled = result.throttled,
            "Batch complete"
        );

        if self.config.overwrite_duplicate_attributes && !result.duplicate_users.is_empty() {
            self.reconcile_duplicates(&result.duplicate_users, cancel)
                .await;
        }

        let audit = ImportAuditLog::from_batch(
            page_key,
            sequence,
            &submitted_upns,
            &result,
            started.elapsed().as_millis() as u64,
        );
        audit.persist(&self.store, &self.config.container).await;
    }

    /// Re-applies the two migration-tracking attributes to users that
    /// already existed in the target tenant. Only those two fields are
    /// touched; everything else on the existing record is left alone.
    async fn reconcile_duplicates(
        &self,
        duplicates: &[UserProfile],
        cancel: &CancellationToken,
    ) {
        for user in duplicates {
            if let Err(error) = self.reconcile_one(user, cancel).await {
                warn!(user = user.log_name(), %error, "Duplicate reconciliation failed");
            }
        }
    }

    async fn reconcile_one(
        &self,
        user: &UserProfile,
        cancel: &CancellationToken,
    ) -> PipelineResult<()> {
        let upn = user
            .user_principal_name
            .as_deref()
            .ok_or_else(|| PipelineError::Config("duplicate record without UPN".into()))?;

        // The directory accepts the UPN as the id path segment.
        let existing = self
            .client
            .get_user_by_id(upn, &["id".to_string()], cancel)
            .await?;
        let Some(existing) = existing else {
            warn!(user = upn, "Duplicate no longer present, skipping reconciliation");
            return Ok(());
        };
        let id = existing
            .id
            .ok_or_else(|| PipelineError::Config("existing user record without id".into()))?;

        let mut fields = Map::new();
        let object_id_attr = self.config.object_id_attribute();
        if let Some(value) = user.extension_attributes.get(&object_id_attr) {
            fields.insert(object_id_attr, serde_json::to_value(value)?);
        }
        let requires_attr = self.config.requires_migration_attribute();
        if let Some(value) = user.extension_attributes.get(&requires_attr) {
            fields.insert(requires_attr, serde_json::to_value(value)?);
        }
        if fields.is_empty() {
            return Ok(());
        }

        self.client.update_user(&id, fields, cancel).await?;
        info!(user = upn, "Reconciled tracking attributes onto existing user");
        Ok(())
    }
}
