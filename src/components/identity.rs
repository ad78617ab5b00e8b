// Identity acquisition with a bounded retry loop
// The SDK finishes its registration handshake some time after permission is granted,
// so reads are retried on a fixed schedule until an identifier appears

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::capability::{CapabilityDetector, CapabilityProfile};
use super::provider::{IdentityAccessor, ProviderHandle};
use super::serde_time::duration_millis;
use super::{SdkError, SubscriptionIdentity};

/// Retry policy for identity reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay between consecutive attempts
    pub backoff_strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_strategy: BackoffStrategy::Fixed(Duration::from_secs(1)),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff_strategy: BackoffStrategy) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_strategy,
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::new(max_attempts, BackoffStrategy::Fixed(delay))
    }

    /// Delay to wait after the given zero-based attempt
    pub fn calculate_next_delay(&self, attempt: u32) -> Duration {
        self.backoff_strategy.calculate_delay(attempt)
    }

    pub fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.max_attempts
    }
}

/// Backoff strategies for retry delays
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(#[serde(with = "duration_millis")] Duration),
    /// Linear increase in delay
    Linear {
        #[serde(with = "duration_millis")]
        base_delay: Duration,
        #[serde(with = "duration_millis")]
        increment: Duration,
        #[serde(with = "duration_millis")]
        max_delay: Duration,
    },
    /// Exponential backoff with optional jitter
    ExponentialWithJitter {
        #[serde(with = "duration_millis")]
        base_delay: Duration,
        #[serde(with = "duration_millis")]
        max_delay: Duration,
        multiplier: f64,
        jitter: f64,
    },
}

impl BackoffStrategy {
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            BackoffStrategy::Fixed(delay) => *delay,
            BackoffStrategy::Linear {
                base_delay,
                increment,
                max_delay,
            } => {
                base_delay
                    .saturating_add(increment.saturating_mul(attempt))
                    .min(*max_delay)
            },
            BackoffStrategy::ExponentialWithJitter {
                base_delay,
                max_delay,
                multiplier,
                jitter,
            } => {
                // float to int casts saturate
                let exponential_delay = Duration::from_millis(
                    (base_delay.as_millis() as f64 * multiplier.powi(attempt.min(i32::MAX as u32) as i32))
                        as u64,
                );

                let with_jitter = if *jitter > 0.0 {
                    let jitter_amount = exponential_delay.as_millis() as f64
                        * jitter
                        * (rand::random::<f64>() - 0.5)
                        * 2.0;
                    Duration::from_millis(
                        (exponential_delay.as_millis() as f64 + jitter_amount).max(0.0) as u64,
                    )
                } else {
                    exponential_delay
                };

                with_jitter.min(*max_delay)
            },
        }
    }
}

/// An accessor call that failed during acquisition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessorFailure {
    pub attempt: u32,
    pub accessor: IdentityAccessor,
    pub message: String,
}

/// Result of an acquisition run; exhaustion is not an error
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Found {
        identity: SubscriptionIdentity,
        accessor: IdentityAccessor,
        attempts: u32,
        failures: Vec<AccessorFailure>,
    },
    NotFound {
        attempts: u32,
        failures: Vec<AccessorFailure>,
    },
}

impl Acquisition {
    pub fn identity(&self) -> Option<&SubscriptionIdentity> {
        match self {
            Acquisition::Found { identity, .. } => Some(identity),
            Acquisition::NotFound { .. } => None,
        }
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Acquisition::Found { attempts, .. } | Acquisition::NotFound { attempts, .. } => {
                *attempts
            },
        }
    }

    pub fn failures(&self) -> &[AccessorFailure] {
        match self {
            Acquisition::Found { failures, .. } | Acquisition::NotFound { failures, .. } => {
                failures
            },
        }
    }
}

/// Reads the subscription identity through whichever accessors the SDK exposes
pub struct IdentityAcquirer {
    provider: ProviderHandle,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl IdentityAcquirer {
    pub fn new(provider: ProviderHandle, policy: RetryPolicy) -> Self {
        Self {
            provider,
            policy,
            call_timeout: Duration::from_secs(2),
        }
    }

    /// Upper bound for a single accessor call; an accessor that never answers counts as failed
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// One pass over the profile's accessors in priority order
    pub async fn read_once(
        &self,
        profile: &CapabilityProfile,
        attempt: u32,
        failures: &mut Vec<AccessorFailure>,
    ) -> Option<(SubscriptionIdentity, IdentityAccessor)> {
        let provider = self.provider.current()?;

        for accessor in &profile.identity_accessors {
            let answer = tokio::time::timeout(self.call_timeout, provider.read_identity(*accessor))
                .await
                .unwrap_or_else(|_| {
                    Err(SdkError::new(
                        accessor.method_name(),
                        format!("no answer within {}ms", self.call_timeout.as_millis()),
                    ))
                });
            match answer {
                Ok(Some(raw)) => match SubscriptionIdentity::new(raw) {
                    Some(identity) => return Some((identity, *accessor)),
                    None => {
                        tracing::debug!(
                            attempt,
                            accessor = accessor.method_name(),
                            "accessor returned an empty identity"
                        );
                    },
                },
                Ok(None) => {
                    tracing::debug!(
                        attempt,
                        accessor = accessor.method_name(),
                        "accessor returned no identity"
                    );
                },
                Err(e) => {
                    tracing::debug!(
                        attempt,
                        accessor = accessor.method_name(),
                        error = %e,
                        "accessor failed"
                    );
                    failures.push(AccessorFailure {
                        attempt,
                        accessor: *accessor,
                        message: e.to_string(),
                    });
                },
            }
        }

        None
    }

    /// Retry until an identity appears or the attempt budget is spent
    pub async fn acquire(&self) -> Acquisition {
        let mut failures = Vec::new();
        let mut attempt = 0;

        while self.policy.should_retry(attempt) {
            attempt += 1;

            // capabilities can appear between attempts while the SDK loads
            let profile = CapabilityDetector::detect(&self.provider);
            if let Some((identity, accessor)) = self.read_once(&profile, attempt, &mut failures).await
            {
                tracing::info!(
                    attempt,
                    accessor = accessor.method_name(),
                    "subscription identity acquired"
                );
                return Acquisition::Found {
                    identity,
                    accessor,
                    attempts: attempt,
                    failures,
                };
            }

            if self.policy.should_retry(attempt) {
                let delay = self.policy.calculate_next_delay(attempt - 1);
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "identity not available yet");
                tokio::time::sleep(delay).await;
            }
        }

        tracing::warn!(
            attempts = attempt,
            failures = failures.len(),
            "subscription identity not found"
        );
        Acquisition::NotFound {
            attempts: attempt,
            failures,
        }
    }
}
