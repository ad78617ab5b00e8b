// Reconciliation tuning knobs
// Every field has a default so partial JSON documents are accepted

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::identity::{BackoffStrategy, RetryPolicy};
use super::serde_time::duration_millis;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Identity acquisition retry policy
    pub retry: RetryPolicy,
    /// How long to wait for the SDK to expose any known surface
    #[serde(with = "duration_millis")]
    pub readiness_timeout: Duration,
    /// Re-check interval while waiting for readiness
    #[serde(with = "duration_millis")]
    pub readiness_poll_interval: Duration,
    /// Upper bound for each individual diagnosis probe
    #[serde(with = "duration_millis")]
    pub probe_timeout: Duration,
    /// Maximum JSON depth walked when scanning for alternative identifiers
    pub scan_depth: usize,
    /// Share one in-flight subscribe run between concurrent calls for a user
    pub deduplicate_in_flight: bool,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            readiness_timeout: Duration::from_secs(10),
            readiness_poll_interval: Duration::from_millis(100),
            probe_timeout: Duration::from_secs(2),
            scan_depth: 4,
            deduplicate_in_flight: true,
        }
    }
}

impl ReconcileConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.retry.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry.backoff_strategy = BackoffStrategy::Fixed(delay);
        self
    }

    pub fn with_backoff(mut self, strategy: BackoffStrategy) -> Self {
        self.retry.backoff_strategy = strategy;
        self
    }

    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    pub fn with_readiness_poll_interval(mut self, interval: Duration) -> Self {
        self.readiness_poll_interval = interval;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_deduplication(mut self, enabled: bool) -> Self {
        self.deduplicate_in_flight = enabled;
        self
    }
}
