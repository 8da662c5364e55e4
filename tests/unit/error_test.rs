//! Tests for error types

use prometheus_event_stage::core::{ConfigError, ManagerError, PoolError, SinkError};

#[test]
fn test_sink_full_error() {
    let err = SinkError::Full("need 3, room for 1".to_string());
    assert_eq!(format!("{}", err), "sink full: need 3, room for 1");
}

#[test]
fn test_sink_closed_error() {
    assert_eq!(format!("{}", SinkError::Closed), "sink closed");
    assert_eq!(
        format!("{}", SinkError::AlreadyResolved),
        "prepared enqueue has already been processed"
    );
}

#[test]
fn test_pool_errors() {
    assert_eq!(
        format!("{}", PoolError::Exhausted),
        "thread pool exhausted: no worker available"
    );
    assert_eq!(format!("{}", PoolError::Shutdown), "thread pool has been shut down");
    assert_eq!(
        format!("{}", PoolError::InvalidConfig("max_threads".into())),
        "invalid configuration: max_threads"
    );
}

#[test]
fn test_manager_error_wraps_pool_error() {
    let err: ManagerError = PoolError::Shutdown.into();
    assert_eq!(err, ManagerError::Pool(PoolError::Shutdown));
    assert_eq!(format!("{}", err), "thread pool has been shut down");
    assert_eq!(
        format!("{}", ManagerError::NotInitialized),
        "thread manager must be initialized first"
    );
}

#[test]
fn test_config_error_display() {
    let err = ConfigError::Invalid {
        key: "capacity".into(),
        reason: "must be positive".into(),
    };
    assert_eq!(format!("{}", err), "invalid value for `capacity`: must be positive");
    let wrapped: ManagerError = err.clone().into();
    assert_eq!(wrapped, ManagerError::Config(err));
}

#[test]
fn test_app_result_carries_context() {
    use anyhow::Context;
    let result: prometheus_event_stage::core::AppResult<()> =
        Err(SinkError::Closed).context("forwarding batch");
    let err = result.unwrap_err();
    assert_eq!(format!("{}", err), "forwarding batch");
    assert!(err.downcast_ref::<SinkError>().is_some());
}
