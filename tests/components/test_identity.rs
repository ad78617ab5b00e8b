//! Tests for components/identity.rs

use std::sync::Arc;
use std::time::Duration;

use push_reconcile::components::{
    Acquisition, BackoffStrategy, CapabilityDetector, IdentityAccessor, IdentityAcquirer,
    ProviderHandle, RetryPolicy, SdkError,
};

use crate::support::ScriptedProvider;

fn acquirer(provider: &Arc<ScriptedProvider>) -> IdentityAcquirer {
    IdentityAcquirer::new(
        ProviderHandle::with_provider(provider.clone()),
        RetryPolicy::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_no_accessors_exhausts_all_attempts() {
    let provider = Arc::new(ScriptedProvider::bare());
    let started = tokio::time::Instant::now();

    let acquisition = acquirer(&provider).acquire().await;

    assert!(matches!(acquisition, Acquisition::NotFound { attempts: 5, .. }));
    assert_eq!(provider.total_calls(), 0);
    // four waits between five attempts, none after the last
    assert_eq!(started.elapsed(), Duration::from_secs(4));
}

#[tokio::test(start_paused = true)]
async fn test_each_accessor_called_at_most_once_per_attempt() {
    let provider = Arc::new(
        ScriptedProvider::legacy_sdk()
            .with_identity(IdentityAccessor::UserIdGetter, vec![Ok(None)])
            .with_identity(IdentityAccessor::PlayerIdGetter, vec![Ok(None)]),
    );

    let acquisition = acquirer(&provider).acquire().await;

    assert_eq!(acquisition.attempts(), 5);
    assert!(acquisition.identity().is_none());
    assert_eq!(provider.calls("getUserId"), 5);
    assert_eq!(provider.calls("getPlayerId"), 5);
}

#[tokio::test(start_paused = true)]
async fn test_identity_found_on_third_attempt() {
    let provider = Arc::new(ScriptedProvider::legacy_sdk().with_identity(
        IdentityAccessor::UserIdGetter,
        vec![Ok(None), Ok(None), Ok(Some("abc123"))],
    ));

    let acquisition = acquirer(&provider).acquire().await;

    match acquisition {
        Acquisition::Found {
            identity,
            accessor,
            attempts,
            failures,
        } => {
            assert_eq!(identity.as_str(), "abc123");
            assert_eq!(accessor, IdentityAccessor::UserIdGetter);
            assert_eq!(attempts, 3);
            assert!(failures.is_empty());
        },
        other => panic!("expected an identity, got {:?}", other),
    }
    assert_eq!(provider.calls("getUserId"), 3);
}

#[tokio::test(start_paused = true)]
async fn test_empty_string_counts_as_not_found() {
    let provider = Arc::new(ScriptedProvider::legacy_sdk().with_identity(
        IdentityAccessor::UserIdGetter,
        vec![Ok(Some("")), Ok(Some("   ")), Ok(Some("player-42"))],
    ));

    let acquisition = acquirer(&provider).acquire().await;

    assert_eq!(acquisition.attempts(), 3);
    assert_eq!(acquisition.identity().map(|id| id.as_str()), Some("player-42"));
}

#[tokio::test]
async fn test_failing_accessor_falls_through_to_next() {
    let provider = Arc::new(
        ScriptedProvider::current_sdk()
            .with_identity(
                IdentityAccessor::SubscriptionIdProperty,
                vec![Err(SdkError::new("User.PushSubscription.id", "not ready"))],
            )
            .with_identity(IdentityAccessor::SubscriptionIdAsync, vec![Ok(Some("sub-9f2"))]),
    );

    let acquisition = acquirer(&provider).acquire().await;

    assert_eq!(acquisition.attempts(), 1);
    assert_eq!(acquisition.identity().map(|id| id.as_str()), Some("sub-9f2"));
    assert_eq!(acquisition.failures().len(), 1);
    assert_eq!(
        acquisition.failures()[0].accessor,
        IdentityAccessor::SubscriptionIdProperty
    );
    assert!(acquisition.failures()[0].message.contains("not ready"));
}

#[tokio::test]
async fn test_read_once_follows_profile_priority() {
    let provider = Arc::new(
        ScriptedProvider::with_surfaces(push_reconcile::components::SdkSurface::all())
            .with_identity(IdentityAccessor::SubscriptionIdProperty, vec![Ok(Some("current"))])
            .with_identity(IdentityAccessor::UserIdGetter, vec![Ok(Some("legacy"))]),
    );
    let acquirer = acquirer(&provider);
    let profile = CapabilityDetector::inspect(provider.as_ref());
    let mut failures = Vec::new();

    let (identity, accessor) = acquirer.read_once(&profile, 1, &mut failures).await.unwrap();

    assert_eq!(identity.as_str(), "current");
    assert_eq!(accessor, IdentityAccessor::SubscriptionIdProperty);
    assert_eq!(provider.calls("getUserId"), 0);
}

#[tokio::test]
async fn test_missing_provider_is_not_found() {
    let acquirer = IdentityAcquirer::new(ProviderHandle::new(), RetryPolicy::fixed(1, Duration::ZERO));

    let acquisition = acquirer.acquire().await;

    assert!(matches!(acquisition, Acquisition::NotFound { attempts: 1, .. }));
}

#[test]
fn test_retry_policy_bounds() {
    let policy = RetryPolicy::default();

    assert!(policy.should_retry(4));
    assert!(!policy.should_retry(5));
    assert_eq!(RetryPolicy::fixed(0, Duration::ZERO).max_attempts, 1);
}

#[test]
fn test_backoff_delays() {
    let fixed = BackoffStrategy::Fixed(Duration::from_millis(250));
    assert_eq!(fixed.calculate_delay(0), Duration::from_millis(250));
    assert_eq!(fixed.calculate_delay(7), Duration::from_millis(250));

    let linear = BackoffStrategy::Linear {
        base_delay: Duration::from_millis(100),
        increment: Duration::from_millis(50),
        max_delay: Duration::from_millis(180),
    };
    assert_eq!(linear.calculate_delay(0), Duration::from_millis(100));
    assert_eq!(linear.calculate_delay(1), Duration::from_millis(150));
    assert_eq!(linear.calculate_delay(2), Duration::from_millis(180));

    let exponential = BackoffStrategy::ExponentialWithJitter {
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(1),
        multiplier: 2.0,
        jitter: 0.0,
    };
    let delays: Vec<_> = (0..5).map(|attempt| exponential.calculate_delay(attempt)).collect();
    assert_eq!(
        delays,
        vec![
            Duration::from_millis(100),
            Duration::from_millis(200),
            Duration::from_millis(400),
            Duration::from_millis(800),
            Duration::from_secs(1),
        ]
    );
}

#[test]
fn test_jitter_stays_within_bounds() {
    let strategy = BackoffStrategy::ExponentialWithJitter {
        base_delay: Duration::from_millis(1000),
        max_delay: Duration::from_secs(60),
        multiplier: 1.0,
        jitter: 0.5,
    };

    for _ in 0..50 {
        let delay = strategy.calculate_delay(3);
        assert!(delay >= Duration::from_millis(500));
        assert!(delay <= Duration::from_millis(1500));
    }
}

#[tokio::test(start_paused = true)]
async fn test_hanging_accessor_is_abandoned_after_call_timeout() {
    let provider = Arc::new(
        ScriptedProvider::current_sdk()
            .hanging(IdentityAccessor::SubscriptionIdProperty)
            .with_identity(IdentityAccessor::SubscriptionIdAsync, vec![Ok(Some("sub-5"))]),
    );
    let acquirer = acquirer(&provider).with_call_timeout(Duration::from_millis(300));
    let started = tokio::time::Instant::now();

    let acquisition = acquirer.acquire().await;

    assert_eq!(acquisition.identity().map(|id| id.as_str()), Some("sub-5"));
    assert_eq!(acquisition.attempts(), 1);
    assert_eq!(acquisition.failures().len(), 1);
    assert!(acquisition.failures()[0].message.contains("no answer within 300ms"));
    assert_eq!(started.elapsed(), Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn test_only_accessor_hanging_ends_in_not_found() {
    let provider = Arc::new(
        ScriptedProvider::legacy_sdk().hanging(IdentityAccessor::UserIdGetter),
    );
    let acquirer = IdentityAcquirer::new(
        ProviderHandle::with_provider(provider.clone()),
        RetryPolicy::fixed(2, Duration::from_millis(100)),
    )
    .with_call_timeout(Duration::from_secs(1));

    let acquisition = acquirer.acquire().await;

    assert!(matches!(acquisition, Acquisition::NotFound { attempts: 2, .. }));
    assert_eq!(acquisition.failures().len(), 2);
}

#[test]
fn test_huge_linear_increment_saturates_at_max_delay() {
    let linear = BackoffStrategy::Linear {
        base_delay: Duration::from_secs(1),
        increment: Duration::from_secs(u64::MAX / 2),
        max_delay: Duration::from_secs(30),
    };

    assert_eq!(linear.calculate_delay(4), Duration::from_secs(30));
    assert_eq!(linear.calculate_delay(u32::MAX), Duration::from_secs(30));
}

#[test]
fn test_huge_linear_increment_from_config() {
    let config = push_reconcile::components::ReconcileConfig::from_json(&format!(
        r#"{{"retry":{{"max_attempts":5,"backoff_strategy":{{"linear":{{"base_delay":{max},"increment":{max},"max_delay":5000}}}}}}}}"#,
        max = u64::MAX
    ))
    .unwrap();

    assert_eq!(config.retry.calculate_next_delay(3), Duration::from_secs(5));
}

#[test]
fn test_huge_exponential_attempt_saturates_at_max_delay() {
    let exponential = BackoffStrategy::ExponentialWithJitter {
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(10),
        multiplier: 2.0,
        jitter: 0.0,
    };

    assert_eq!(exponential.calculate_delay(u32::MAX), Duration::from_secs(10));
}
