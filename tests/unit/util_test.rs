//! Tests for utility functions

use prometheus_event_stage::util::{init_tracing, init_tracing_with};

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing();
    assert!(!init_tracing_with("debug"));
    init_tracing();
}
