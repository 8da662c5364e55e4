//! Tests for the tokio-backed thread pool

use prometheus_event_stage::config::ThreadPoolConfig;
use prometheus_event_stage::core::ThreadPool;
use prometheus_event_stage::runtime::TokioThreadPool;
use std::time::Duration;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_tokio_pool_on_current_runtime() {
    let pool = TokioThreadPool::new(
        tokio::runtime::Handle::current(),
        &ThreadPoolConfig::new().with_min_threads(1).with_max_threads(2),
    )
    .unwrap();

    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = pool
        .execute(Box::new(move || {
            tx.send(123).unwrap();
        }))
        .unwrap();

    let result = rx.await.expect("oneshot result");
    assert_eq!(result, 123);
    let finished = tokio::task::spawn_blocking(move || handle.join(Duration::from_secs(5)))
        .await
        .unwrap();
    assert!(finished);
    assert_eq!(pool.pool_size(), 2);
}

#[test]
fn test_tokio_pool_rejects_invalid_config() {
    let result = TokioThreadPool::with_runtime(&ThreadPoolConfig::new().with_max_threads(0));
    assert!(result.is_err());
}
