//! Core abstractions: queues, pipelines, thread pools and thread managers.

pub mod command;
pub mod elastic;
pub mod element;
pub mod error;
pub mod pipeline;
pub mod sink;
pub mod thread_manager;
pub mod thread_pool;

pub use command::{
    Command, CommandEvent, CommandManager, DelayedCommand, RepeatedCommand, Signal, SignalHandler,
};
pub use elastic::ElasticPoolInterceptor;
pub use element::QueueElement;
pub use error::{AppResult, ConfigError, ManagerError, PoolError, SinkError};
pub use pipeline::{EventHandler, EventPipeline, FnHandler, PipelineRunner, PipelineTask, SimplePipeline};
pub use sink::{
    DequeueInterceptor, NullDequeueInterceptor, PreparedEnqueue, Queue, QueueSize, Reservation, Sink, Source,
};
#[cfg(not(target_arch = "wasm32"))]
pub use thread_manager::TpcThreadManager;
pub use thread_manager::{ManagerState, PooledThreadManager, ThreadManager, TpspThreadManager};
#[cfg(not(target_arch = "wasm32"))]
pub use thread_pool::WorkerThreadPool;
pub use thread_pool::{Job, PoolStats, TaskHandle, ThreadPool};
