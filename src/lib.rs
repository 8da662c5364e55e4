//! # Prometheus Event Stage
//!
//! Staged event processing: bounded queues between stages, pipelines that
//! drain them, and thread managers that run those pipelines on a pool.
//!
//! ## Core Problem Solved
//!
//! Work arriving in bursts must be buffered without letting any single stage
//! exhaust memory or threads:
//!
//! - **Bounded Queues**: capacity limits are enforced and reported to producers
//! - **Two-Phase Enqueue**: producers reserve room first, then commit or abort
//! - **Non-Blocking Drains**: consumers wait for the queue lock, never for data
//! - **Isolated Pipelines**: a failing handler never stops the scheduler
//!
//! ## Queues
//!
//! ```rust,ignore
//! use prometheus_event_stage::core::{Sink, Source};
//! use prometheus_event_stage::infra::FixedSizeQueue;
//!
//! let queue = FixedSizeQueue::with_capacity(2)?;
//! queue.enqueue("a")?;
//! queue.enqueue("b")?;
//! assert!(queue.enqueue("c").is_err());
//!
//! let prepared = queue.prepare_enqueue(vec!["c"]);
//! assert!(prepared.is_err());
//! assert_eq!(queue.dequeue(), Some("a"));
//! ```
//!
//! ## Scheduling Pipelines
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use prometheus_event_stage::config::ThreadManagerConfig;
//! use prometheus_event_stage::core::{
//!     FnHandler, SimplePipeline, Source, ThreadManager, TpcThreadManager,
//! };
//! use prometheus_event_stage::infra::DefaultQueue;
//!
//! let queue = Arc::new(DefaultQueue::unbounded());
//! let pipeline = Arc::new(SimplePipeline::new(
//!     "audit",
//!     vec![queue.clone() as Arc<dyn Source<String>>],
//!     Arc::new(FnHandler::new(|batch: Vec<String>| {
//!         println!("{batch:?}");
//!         Ok(())
//!     })),
//! ));
//!
//! let manager = TpcThreadManager::new(ThreadManagerConfig::default())?;
//! manager.register(pipeline)?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Core abstractions: queues, pipelines, pools and managers.
pub mod core;
/// Configuration models for queues, pools, and thread managers.
pub mod config;
/// Builders to construct queues and managers from configuration.
pub mod builders;
/// Queue implementations.
pub mod infra;
/// Runtime adapters for async runtimes.
#[cfg(feature = "tokio-runtime")]
pub mod runtime;
/// Shared utilities.
pub mod util;
