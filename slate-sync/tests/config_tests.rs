use pretty_assertions::assert_eq;
use slate_sync::{RollbackPolicy, SyncConfig};
use std::time::Duration;

#[test]
fn default_config() {
    let config = SyncConfig::default();
    assert_eq!(config.max_retries, 3);
    assert_eq!(config.retry_base_delay_ms, 1_000);
    assert_eq!(config.remote_timeout_ms, 30_000);
    assert_eq!(config.rollback_policy, RollbackPolicy::Immediate);
}

#[test]
fn backoff_doubles_per_retry() {
    let config = SyncConfig::default();
    assert_eq!(config.backoff_for(0), Duration::from_secs(1));
    assert_eq!(config.backoff_for(1), Duration::from_secs(2));
    assert_eq!(config.backoff_for(2), Duration::from_secs(4));
    assert_eq!(config.backoff_for(3), Duration::from_secs(8));
}

#[test]
fn backoff_saturates() {
    let config = SyncConfig::default();
    assert!(config.backoff_for(40) >= config.backoff_for(31));
    assert!(config.backoff_for(u32::MAX) > Duration::ZERO);
}

#[test]
fn partial_json_keeps_defaults() {
    let json = r#"{"max_retries": 5, "rollback_policy": "after_retries_exhausted"}"#;
    let config = SyncConfig::from_json_str(json).unwrap();
    assert_eq!(config.max_retries, 5);
    assert_eq!(config.rollback_policy, RollbackPolicy::AfterRetriesExhausted);
    assert_eq!(config.retry_base_delay(), Duration::from_secs(1));
    assert_eq!(config.remote_timeout(), Duration::from_secs(30));
}

#[test]
fn invalid_json_is_an_error() {
    assert!(SyncConfig::from_json_str("{not json").is_err());
    assert!(SyncConfig::from_json_str(r#"{"rollback_policy": "sometimes"}"#).is_err());
}
