//! Tests for components/config.rs

use std::time::Duration;

use push_reconcile::components::{BackoffStrategy, ReconcileConfig, RetryPolicy};

#[test]
fn test_defaults() {
    let config = ReconcileConfig::default();

    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(
        config.retry.backoff_strategy,
        BackoffStrategy::Fixed(Duration::from_secs(1))
    );
    assert_eq!(config.readiness_timeout, Duration::from_secs(10));
    assert_eq!(config.readiness_poll_interval, Duration::from_millis(100));
    assert_eq!(config.probe_timeout, Duration::from_secs(2));
    assert_eq!(config.scan_depth, 4);
    assert!(config.deduplicate_in_flight);
}

#[test]
fn test_partial_json_keeps_remaining_defaults() -> anyhow::Result<()> {
    let config = ReconcileConfig::from_json(
        r#"{"readiness_timeout":5000,"retry":{"max_attempts":3,"backoff_strategy":{"fixed":250}}}"#,
    )?;

    assert_eq!(config.readiness_timeout, Duration::from_secs(5));
    assert_eq!(
        config.retry,
        RetryPolicy::fixed(3, Duration::from_millis(250))
    );
    assert_eq!(config.probe_timeout, Duration::from_secs(2));
    assert!(config.deduplicate_in_flight);
    Ok(())
}

#[test]
fn test_linear_backoff_from_json() {
    let config = ReconcileConfig::from_json(
        r#"{"retry":{"max_attempts":4,"backoff_strategy":{"linear":{"base_delay":100,"increment":50,"max_delay":180}}}}"#,
    )
    .unwrap();

    assert_eq!(
        config.retry.backoff_strategy,
        BackoffStrategy::Linear {
            base_delay: Duration::from_millis(100),
            increment: Duration::from_millis(50),
            max_delay: Duration::from_millis(180),
        }
    );
}

#[test]
fn test_durations_serialize_as_milliseconds() -> anyhow::Result<()> {
    let json = serde_json::to_value(ReconcileConfig::default())?;

    assert_eq!(json["readiness_timeout"], 10_000);
    assert_eq!(json["readiness_poll_interval"], 100);
    assert_eq!(json["retry"]["backoff_strategy"]["fixed"], 1_000);
    Ok(())
}

#[test]
fn test_invalid_json_is_rejected() {
    assert!(ReconcileConfig::from_json(r#"{"readiness_timeout":"soon"}"#).is_err());
}

#[test]
fn test_builder_methods() {
    let config = ReconcileConfig::default()
        .with_max_attempts(0)
        .with_retry_delay(Duration::from_millis(20))
        .with_readiness_timeout(Duration::from_millis(500))
        .with_deduplication(false);

    // at least one attempt is always made
    assert_eq!(config.retry.max_attempts, 1);
    assert_eq!(
        config.retry.backoff_strategy,
        BackoffStrategy::Fixed(Duration::from_millis(20))
    );
    assert_eq!(config.readiness_timeout, Duration::from_millis(500));
    assert!(!config.deduplicate_in_flight);
}
