//! Directory client metrics for observability.

/// Counters exposed by the directory client.
#[derive(Debug, Clone, Default)]
pub struct ClientMetrics {
    /// Requests that completed successfully.
    pub total_requests: u64,
    /// Count of 429 responses received.
    pub rate_limited_count: u64,
    /// Retry attempts made (throttle and transient combined).
    pub retry_count: u64,
    /// Transient 5xx responses received.
    pub transient_error_count: u64,
}

impl ClientMetrics {
    /// Creates zeroed metrics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.total_requests += 1;
    }

    pub fn record_rate_limited(&mut self) {
        self.rate_limited_count += 1;
    }

    pub fn record_retry(&mut self) {
        self.retry_count += 1;
    }

    pub fn record_transient_error(&mut self) {
        self.transient_error_count += 1;
    }

    /// Rate limit ratio over successful requests.
    #[must_use]
    pub fn rate_limit_ratio(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.rate_limited_count as f64 / self.total_requests as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let mut m = ClientMetrics::new();
        m.record_success();
        m.record_success();
        m.record_rate_limited();
        m.record_retry();

        assert_eq!(m.total_requests, 2);
        assert_eq!(m.rate_limited_count, 1);
        assert_eq!(m.retry_count, 1);
        assert_eq!(m.rate_limit_ratio(), 0.5);
    }

    #[test]
    fn test_ratio_with_no_requests() {
        assert_eq!(ClientMetrics::new().rate_limit_ratio(), 0.0);
    }
}
