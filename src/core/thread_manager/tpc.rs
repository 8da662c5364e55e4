//! Self-sizing manager: a dedicated pool sized from the processor count.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::{Parameters, ThreadManagerConfig};
use crate::core::{EventPipeline, ManagerError, ThreadPool, WorkerThreadPool};

use super::{ManagerState, PooledThreadManager, ThreadManager};

/// Thread-per-processor manager.
///
/// Owns a [`WorkerThreadPool`] of `processors * threads_per_processor + 1`
/// workers and is ready to take registrations as soon as it is built.
pub struct TpcThreadManager {
    config: ThreadManagerConfig,
    pool: Arc<WorkerThreadPool>,
    manager: PooledThreadManager,
}

impl TpcThreadManager {
    /// Build the pool and start scheduling.
    ///
    /// # Errors
    ///
    /// `ManagerError::Config` for invalid settings, `ManagerError::Pool` when
    /// the pool or the scheduler thread could not be started.
    pub fn new(config: ThreadManagerConfig) -> Result<Self, ManagerError> {
        config.validate()?;
        let pool = Arc::new(WorkerThreadPool::new(config.thread_pool_config())?);

        let manager = PooledThreadManager::with_name(
            "event-tpc-loop",
            Duration::from_millis(config.sleep_time_ms),
        );
        manager.set_thread_pool(Arc::clone(&pool) as Arc<dyn ThreadPool>)?;
        manager.initialize()?;

        info!(
            manager = %manager.id(),
            processors = config.processors,
            threads_per_processor = config.threads_per_processor,
            pool_size = config.pool_size(),
            "thread-per-processor manager started"
        );

        Ok(Self {
            config,
            pool,
            manager,
        })
    }

    /// Build from generic parameters (`processors`, `threads-per-processor`,
    /// `sleep-time`, `block-timeout`).
    ///
    /// # Errors
    ///
    /// As [`new`](Self::new), plus unparseable parameter values.
    pub fn from_parameters(params: &Parameters) -> Result<Self, ManagerError> {
        Self::new(ThreadManagerConfig::from_parameters(params)?)
    }

    /// Effective settings.
    #[must_use]
    pub const fn config(&self) -> &ThreadManagerConfig {
        &self.config
    }

    /// The owned pool.
    #[must_use]
    pub const fn thread_pool(&self) -> &Arc<WorkerThreadPool> {
        &self.pool
    }

    /// The underlying scheduler.
    #[must_use]
    pub const fn manager(&self) -> &PooledThreadManager {
        &self.manager
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ManagerState {
        self.manager.state()
    }

    /// Stop scheduling and shut the pool down.
    pub fn dispose(&self) {
        self.manager.dispose();
        self.pool.shutdown();
    }
}

impl ThreadManager for TpcThreadManager {
    fn register<P>(&self, pipeline: Arc<P>) -> Result<(), ManagerError>
    where
        P: EventPipeline + ?Sized + 'static,
    {
        self.manager.register(pipeline)
    }

    fn deregister<P>(&self, pipeline: &Arc<P>) -> Result<(), ManagerError>
    where
        P: EventPipeline + ?Sized + 'static,
    {
        self.manager.deregister(pipeline)
    }

    fn deregister_all(&self) {
        self.manager.deregister_all();
    }
}
