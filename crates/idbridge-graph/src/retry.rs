//! Retry policy for directory API operations.
//!
//! Every client operation runs through one retry pipeline: exponential
//! backoff with jitter, a bounded number of attempts, and a per-operation
//! timeout. A server-provided `Retry-After` hint overrides the computed
//! delay.

use std::time::Duration;

/// Retry and timeout policy shared by all directory client operations.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum attempts per operation, including the first (default: 5).
    pub max_attempts: u32,
    /// Initial backoff delay (default: 1s).
    pub initial_delay: Duration,
    /// Backoff delay cap (default: 60s).
    pub max_delay: Duration,
    /// Jitter factor as a fraction of the delay (default: 0.25).
    pub jitter_factor: f64,
    /// Bound on one whole operation, across all attempts (default: 120s).
    pub operation_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            jitter_factor: 0.25,
            operation_timeout: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with all defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy optimized for tests (short delays, few attempts).
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            jitter_factor: 0.0,
            operation_timeout: Duration::from_secs(10),
        }
    }

    /// Validates the policy.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be > 0".to_string());
        }
        if self.initial_delay.is_zero() {
            return Err("initial_delay must be > 0".to_string());
        }
        if self.max_delay < self.initial_delay {
            return Err("max_delay must be >= initial_delay".to_string());
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err("jitter_factor must be in range [0.0, 1.0]".to_string());
        }
        Ok(())
    }

    /// Computes the exponential backoff delay for a retry attempt (0-based),
    /// capped at `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64;
        let max = self.max_delay.as_millis() as f64;
        let delay_ms = (base * 2_f64.powi(attempt as i32)).min(max);
        Duration::from_millis(delay_ms as u64)
    }

    /// Adds jitter to a delay using the configured factor.
    #[must_use]
    pub fn with_jitter(&self, delay: Duration) -> Duration {
        use rand::Rng;

        if self.jitter_factor == 0.0 {
            return delay;
        }
        let delay_ms = delay.as_millis() as f64;
        let jitter_range = delay_ms * self.jitter_factor;
        let jitter = rand::thread_rng().gen_range(0.0..=jitter_range);
        Duration::from_millis((delay_ms + jitter) as u64)
    }

    /// The delay to wait before a retry: a server hint wins over backoff.
    #[must_use]
    pub fn retry_delay(&self, attempt: u32, retry_after_secs: Option<u64>) -> Duration {
        match retry_after_secs {
            Some(secs) => {
                let capped = Duration::from_secs(secs).min(self.max_delay);
                if Duration::from_secs(secs) > capped {
                    tracing::warn!(
                        retry_after_secs = secs,
                        cap_ms = self.max_delay.as_millis() as u64,
                        "Retry-After exceeds cap, clamping"
                    );
                }
                capped
            }
            None => self.with_jitter(self.backoff_delay(attempt)),
        }
    }
}

/// Whether an HTTP status is retryable under the policy.
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Parses a `Retry-After` header value in seconds form.
#[must_use]
pub fn parse_retry_after(header_value: &str) -> Option<u64> {
    // HTTP-date form is not supported; the directory API sends seconds.
    header_value.trim().parse::<u64>().ok()
}
