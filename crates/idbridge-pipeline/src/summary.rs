//! Run-level accounting for export and import pipelines.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

/// Aggregated counts for one pipeline run.
///
/// Counts accumulate while the run progresses; the summary is finalized and
/// logged once at the end, never per unit of work.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Records seen by the run.
    pub total: usize,
    /// Records exported or created successfully.
    pub success: usize,
    /// Records that failed after retry exhaustion.
    pub failure: usize,
    /// Records skipped as already-existing duplicates.
    pub skipped: usize,
    /// Throttle responses observed across the run.
    pub throttle_events: usize,
    /// Retry attempts spent across the run.
    pub retry_events: usize,
    /// Pages fetched (export) or batches written (import).
    pub units: usize,
}

impl Default for RunSummary {
    fn default() -> Self {
        Self::new()
    }
}

impl RunSummary {
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            total: 0,
            success: 0,
            failure: 0,
            skipped: 0,
            throttle_events: 0,
            retry_events: 0,
            units: 0,
        }
    }

    /// Marks the run finished. Idempotent; the first call wins.
    pub fn finalize(&mut self) {
        if self.finished_at.is_none() {
            self.finished_at = Some(Utc::now());
        }
    }

    /// Wall-clock duration of the run so far (or the final duration once
    /// finalized).
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Successful records per second over the run.
    #[must_use]
    pub fn throughput_per_second(&self) -> f64 {
        let secs = self.elapsed().as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.success as f64 / secs
    }

    /// Logs the final summary with projected wall-clock time for larger
    /// directories at the observed rate.
    pub fn log_completion(&self, operation: &str) {
        let rate = self.throughput_per_second();
        info!(
            operation,
            total = self.total,
            success = self.success,
            failure = self.failure,
            skipped = self.skipped,
            throttle_events = self.throttle_events,
            retry_events = self.retry_events,
            units = self.units,
            elapsed_secs = self.elapsed().as_secs(),
            rate_per_sec = format!("{rate:.1}"),
            "Run complete"
        );
        if rate > 0.0 {
            info!(
                projected_100k_minutes = format!("{:.0}", 100_000.0 / rate / 60.0),
                projected_1m_hours = format!("{:.1}", 1_000_000.0 / rate / 3600.0),
                "Projected throughput at scale"
            );
        }
    }
}

/// Outcome of a full pipeline run.
#[derive(Debug)]
pub struct ExecutionResult {
    /// Whether the run completed without aborting.
    pub success: bool,
    pub summary: RunSummary,
    /// The error that aborted the run, when `success` is false.
    pub error: Option<String>,
}

impl ExecutionResult {
    #[must_use]
    pub fn completed(mut summary: RunSummary) -> Self {
        summary.finalize();
        Self {
            success: true,
            summary,
            error: None,
        }
    }

    #[must_use]
    pub fn aborted(mut summary: RunSummary, error: impl Into<String>) -> Self {
        summary.finalize();
        Self {
            success: false,
            summary,
            error: Some(error.into()),
        }
    }
}
