//! Tests for configuration validation

use prometheus_event_stage::config::{
    EventConfig, Parameters, QueueConfig, QueueKind, ThreadManagerConfig, ThreadPoolConfig,
};
use prometheus_event_stage::core::ConfigError;

#[test]
fn test_queue_config_defaults() {
    let cfg: QueueConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(cfg.kind, QueueKind::Default);
    assert_eq!(cfg.capacity, -1);
    assert_eq!(cfg.timeout_ms, 0);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_fixed_size_queue_needs_capacity() {
    let invalid = QueueConfig {
        kind: QueueKind::FixedSize,
        capacity: 0,
        timeout_ms: 0,
    };
    assert!(invalid.validate().is_err());

    let valid = QueueConfig {
        capacity: 8,
        ..invalid
    };
    assert!(valid.validate().is_ok());
}

#[test]
fn test_thread_pool_config_validation() {
    assert!(ThreadPoolConfig::new().validate().is_ok());
    assert!(ThreadPoolConfig::new().with_max_threads(0).validate().is_err());
    assert!(ThreadPoolConfig::new()
        .with_min_threads(4)
        .with_max_threads(2)
        .validate()
        .is_err());
    assert!(ThreadPoolConfig::new().with_keep_alive_ms(0).validate().is_err());
}

#[test]
fn test_thread_manager_defaults() {
    let cfg = ThreadManagerConfig::default();
    assert!(cfg.processors >= 1);
    assert_eq!(cfg.threads_per_processor, 1);
    assert_eq!(cfg.sleep_time_ms, 1000);
    assert_eq!(cfg.block_timeout_ms, 1000);
    assert_eq!(cfg.pool_size(), cfg.processors + 1);

    let pool = cfg.thread_pool_config();
    assert_eq!(pool.min_threads, cfg.pool_size());
    assert_eq!(pool.max_threads, cfg.pool_size());
    assert_eq!(pool.block_timeout_ms, 1000);
}

#[test]
fn test_thread_manager_rejects_overflowing_pool_size() {
    let cfg = ThreadManagerConfig {
        processors: usize::MAX,
        threads_per_processor: 2,
        ..ThreadManagerConfig::default()
    };
    let err = cfg.validate().unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "threads-per-processor"));
    assert_eq!(cfg.pool_size(), usize::MAX);

    let cfg = ThreadManagerConfig {
        processors: usize::MAX,
        threads_per_processor: 1,
        ..ThreadManagerConfig::default()
    };
    assert!(cfg.validate().is_err());

    let cfg = ThreadManagerConfig {
        processors: usize::MAX - 1,
        threads_per_processor: 1,
        ..ThreadManagerConfig::default()
    };
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_thread_manager_from_parameters() {
    let mut params = Parameters::new();
    params
        .set_parameter("processors", "3")
        .set_parameter("threads-per-processor", "0")
        .set_parameter("sleep-time", "250");

    let cfg = ThreadManagerConfig::from_parameters(&params).unwrap();
    assert_eq!(cfg.processors, 3);
    assert_eq!(cfg.threads_per_processor, 1);
    assert_eq!(cfg.sleep_time_ms, 250);
    assert_eq!(cfg.block_timeout_ms, 1000);
    assert_eq!(cfg.pool_size(), 4);
}

#[test]
fn test_negative_processors_floored() {
    let params: Parameters = [("processors", "-2")].into_iter().collect();
    let cfg = ThreadManagerConfig::from_parameters(&params).unwrap();
    assert_eq!(cfg.processors, 1);
}

#[test]
fn test_unparseable_parameter_rejected() {
    let params: Parameters = [("sleep-time", "soon")].into_iter().collect();
    let err = ThreadManagerConfig::from_parameters(&params).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "sleep-time"));
}

#[test]
fn test_event_config_from_json() {
    let json = r#"{
        "queues": {
            "ingest": { "kind": "fixed_size", "capacity": 128, "timeout_ms": 50 },
            "audit": {}
        },
        "thread_manager": { "processors": 2, "sleep_time_ms": 100 }
    }"#;

    let cfg = EventConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.queues.len(), 2);
    assert_eq!(cfg.queues["ingest"].kind, QueueKind::FixedSize);
    assert_eq!(cfg.queues["ingest"].capacity, 128);
    assert_eq!(cfg.queues["audit"].capacity, -1);
    assert_eq!(cfg.thread_manager.processors, 2);
    assert_eq!(cfg.thread_manager.threads_per_processor, 1);
    assert_eq!(cfg.thread_manager.sleep_time_ms, 100);
}

#[test]
fn test_event_config_reports_queue_name() {
    let json = r#"{ "queues": { "ingest": { "kind": "fixed_size" } } }"#;
    let err = EventConfig::from_json_str(json).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "queues.ingest.capacity"));
}

#[test]
fn test_malformed_json_is_parse_error() {
    let err = ThreadManagerConfig::from_json_str("{ processors: ").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));

    let err = ThreadManagerConfig::from_json_str(r#"{ "processors": 0 }"#).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }));
}
