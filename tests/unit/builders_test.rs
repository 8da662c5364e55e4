//! Tests for builder modules

use prometheus_event_stage::builders::{build_queue, build_queues, build_thread_manager};
use prometheus_event_stage::config::{EventConfig, QueueConfig, QueueKind};
use prometheus_event_stage::core::{ManagerState, QueueSize, Sink, SinkError, Source};

#[test]
fn test_build_default_queue() {
    let queue = build_queue::<u32>(&QueueConfig::default()).unwrap();
    assert_eq!(queue.max_size(), None);
    queue.enqueue_batch((0..100).collect()).unwrap();
    assert_eq!(queue.size(), 100);
}

#[test]
fn test_build_fixed_size_queue() {
    let cfg = QueueConfig {
        kind: QueueKind::FixedSize,
        capacity: 2,
        timeout_ms: 10,
    };
    let queue = build_queue::<&str>(&cfg).unwrap();
    assert_eq!(queue.max_size(), Some(2));
    queue.enqueue("a").unwrap();
    queue.enqueue("b").unwrap();
    assert!(matches!(queue.enqueue("c"), Err(SinkError::Full(_))));
    assert_eq!(queue.dequeue(), Some("a"));
}

#[test]
fn test_build_bounded_default_queue() {
    let cfg = QueueConfig {
        capacity: 3,
        ..QueueConfig::default()
    };
    let queue = build_queue::<u8>(&cfg).unwrap();
    assert_eq!(queue.max_size(), Some(3));
    assert_eq!(queue.can_accept(), Some(3));
}

#[test]
fn test_build_queues_by_name() {
    let cfg = EventConfig::from_json_str(
        r#"{ "queues": { "in": { "capacity": 4 }, "out": { "kind": "fixed_size", "capacity": 1 } } }"#,
    )
    .unwrap();
    let queues = build_queues::<String>(&cfg).unwrap();
    assert_eq!(queues.len(), 2);
    assert_eq!(queues["in"].max_size(), Some(4));
    assert_eq!(queues["out"].max_size(), Some(1));
}

#[test]
fn test_build_thread_manager() {
    let cfg = EventConfig::from_json_str(
        r#"{ "thread_manager": { "processors": 1, "threads_per_processor": 1, "sleep_time_ms": 10 } }"#,
    )
    .unwrap();
    let manager = build_thread_manager(&cfg).unwrap();
    assert_eq!(manager.state(), ManagerState::Running);
    assert_eq!(manager.config().pool_size(), 2);
    manager.dispose();
}
