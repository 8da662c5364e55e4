//! Configuration models for queues, thread pools and thread managers.

pub mod parameters;
pub mod pool;

pub use parameters::Parameters;
pub use pool::{EventConfig, QueueConfig, QueueKind, ThreadManagerConfig, ThreadPoolConfig};
