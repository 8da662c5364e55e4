//! Builders to construct queues and managers from configuration.

pub mod queue_builder;

#[cfg(not(target_arch = "wasm32"))]
pub use queue_builder::build_thread_manager;
pub use queue_builder::{build_queue, build_queues};
