//! Thread-per-pass manager: a new detached thread for every pipeline run.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error};

use crate::config::ThreadManagerConfig;
use crate::core::pipeline::panic_message;
use crate::core::{EventPipeline, Job, ManagerError, PoolError, TaskHandle, ThreadPool};

use super::{ManagerState, PooledThreadManager, ThreadManager};

/// Starts one thread per job. Never refuses work and never reuses threads.
struct SpawningPool {
    next_task_id: AtomicU64,
    live: Arc<AtomicUsize>,
}

impl ThreadPool for SpawningPool {
    fn execute(&self, job: Job) -> Result<TaskHandle, PoolError> {
        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let handle = TaskHandle::pending(task_id);
        let done = handle.clone();
        let live = Arc::clone(&self.live);

        self.live.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new()
            .name(format!("event-tpsp-{task_id}"))
            .spawn(move || {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                    error!(task_id, panic = %panic_message(panic.as_ref()), "pipeline thread panicked");
                }
                live.fetch_sub(1, Ordering::AcqRel);
                done.complete();
            });

        match spawned {
            Ok(_detached) => Ok(handle),
            Err(e) => {
                self.live.fetch_sub(1, Ordering::AcqRel);
                Err(PoolError::Spawn(e.to_string()))
            }
        }
    }

    fn pool_size(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    fn minimum_pool_size(&self) -> usize {
        0
    }

    fn maximum_pool_size(&self) -> usize {
        usize::MAX
    }

    fn set_maximum_pool_size(&self, size: usize) {
        debug!(size, "thread-per-pass pool has no ceiling, ignoring");
    }

    fn create_threads(&self, _count: usize) -> usize {
        0
    }
}

/// Simple manager without backpressure: every pass starts a fresh thread
/// per registered pipeline.
pub struct TpspThreadManager {
    pool: Arc<SpawningPool>,
    manager: PooledThreadManager,
}

impl TpspThreadManager {
    /// Start a manager pausing `sleep_time` between passes.
    ///
    /// # Errors
    ///
    /// `ManagerError::Pool` when the scheduler thread could not be started.
    pub fn new(sleep_time: Duration) -> Result<Self, ManagerError> {
        let pool = Arc::new(SpawningPool {
            next_task_id: AtomicU64::new(0),
            live: Arc::new(AtomicUsize::new(0)),
        });
        let manager = PooledThreadManager::with_name("event-tpsp-loop", sleep_time);
        manager.set_thread_pool(Arc::clone(&pool) as Arc<dyn ThreadPool>)?;
        manager.initialize()?;
        Ok(Self { pool, manager })
    }

    /// Start a manager using the configured sleep time.
    ///
    /// # Errors
    ///
    /// As [`new`](Self::new).
    pub fn from_config(config: &ThreadManagerConfig) -> Result<Self, ManagerError> {
        Self::new(Duration::from_millis(config.sleep_time_ms))
    }

    /// Pipeline threads currently alive.
    #[must_use]
    pub fn live_threads(&self) -> usize {
        self.pool.pool_size()
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

    /// Stop scheduling and refuse further registrations.
    pub fn dispose(&self) {
        self.manager.dispose();
    }
}

impl ThreadManager for TpspThreadManager {
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
