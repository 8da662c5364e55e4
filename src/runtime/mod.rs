//! Runtime adapters for thread pools.

pub mod tokio_pool;

pub use tokio_pool::TokioThreadPool;
