//! Thread pool backed by tokio's blocking thread pool.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, error, info};

use crate::config::ThreadPoolConfig;
use crate::core::pipeline::panic_message;
use crate::core::{Job, PoolError, TaskHandle, ThreadPool};

struct Sizing {
    pool_size: AtomicUsize,
    maximum: AtomicUsize,
    minimum: usize,
    /// Permits to retire as soon as the jobs holding them finish.
    surplus: AtomicUsize,
}

impl Sizing {
    fn take_surplus(&self) -> bool {
        let mut current = self.surplus.load(Ordering::Acquire);
        while current > 0 {
            match self
                .surplus
                .compare_exchange_weak(current, current - 1, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    self.pool_size.fetch_sub(1, Ordering::AcqRel);
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
        false
    }
}

/// Runs jobs with `spawn_blocking` on a tokio runtime.
///
/// Concurrency is capped by a semaphore holding one permit per pool slot.
/// A job that cannot get a permit right away is refused with
/// `PoolError::Exhausted`, mirroring a native pool without idle workers.
pub struct TokioThreadPool {
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
    permits: Arc<Semaphore>,
    sizing: Arc<Sizing>,
    next_task_id: AtomicU64,
    shutdown: AtomicBool,
}

impl TokioThreadPool {
    /// Run jobs on an existing runtime.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` if the configuration is invalid.
    pub fn new(handle: Handle, config: &ThreadPoolConfig) -> Result<Self, PoolError> {
        config
            .validate()
            .map_err(|e| PoolError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            handle,
            runtime: Mutex::new(None),
            permits: Arc::new(Semaphore::new(config.max_threads)),
            sizing: Arc::new(Sizing {
                pool_size: AtomicUsize::new(config.max_threads),
                maximum: AtomicUsize::new(config.max_threads),
                minimum: config.min_threads,
                surplus: AtomicUsize::new(0),
            }),
            next_task_id: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Build and own a dedicated runtime.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` for a bad configuration,
    /// `PoolError::Spawn` if the runtime could not be built.
    pub fn with_runtime(config: &ThreadPoolConfig) -> Result<Self, PoolError> {
        config
            .validate()
            .map_err(|e| PoolError::InvalidConfig(e.to_string()))?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name(config.thread_name_prefix.clone())
            .thread_stack_size(config.thread_stack_size)
            .enable_all()
            .build()
            .map_err(|e| PoolError::Spawn(e.to_string()))?;
        let pool = Self::new(runtime.handle().clone(), config)?;
        *pool.runtime.lock() = Some(runtime);
        info!(max_threads = config.max_threads, "TokioThreadPool initialized");
        Ok(pool)
    }

    /// Permits currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Refuse further jobs and release an owned runtime without blocking.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        self.permits.close();
        if let Some(runtime) = self.runtime.lock().take() {
            runtime.shutdown_background();
        }
        info!("TokioThreadPool shut down");
    }

    fn release(sizing: &Sizing, permit: OwnedSemaphorePermit) {
        if sizing.take_surplus() {
            permit.forget();
        }
    }
}

impl ThreadPool for TokioThreadPool {
    fn execute(&self, job: Job) -> Result<TaskHandle, PoolError> {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::Shutdown);
        }
        let permit = Arc::clone(&self.permits)
            .try_acquire_owned()
            .map_err(|e| match e {
                TryAcquireError::NoPermits => PoolError::Exhausted,
                TryAcquireError::Closed => PoolError::Shutdown,
            })?;

        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let handle = TaskHandle::pending(task_id);
        let done = handle.clone();
        let sizing = Arc::clone(&self.sizing);

        self.handle.spawn_blocking(move || {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                error!(task_id, panic = %panic_message(panic.as_ref()), "Job panicked on blocking thread");
            }
            Self::release(&sizing, permit);
            done.complete();
        });
        debug!(task_id, "job handed to blocking pool");
        Ok(handle)
    }

    fn pool_size(&self) -> usize {
        self.sizing.pool_size.load(Ordering::Acquire)
    }

    fn minimum_pool_size(&self) -> usize {
        self.sizing.minimum
    }

    fn maximum_pool_size(&self) -> usize {
        self.sizing.maximum.load(Ordering::Acquire)
    }

    fn set_maximum_pool_size(&self, size: usize) {
        let size = size.max(self.sizing.minimum).max(1);
        self.sizing.maximum.store(size, Ordering::Release);

        let mut excess = self.pool_size().saturating_sub(size);
        while excess > 0 {
            let Ok(idle) = self.permits.try_acquire() else {
                break;
            };
            idle.forget();
            self.sizing.pool_size.fetch_sub(1, Ordering::AcqRel);
            excess -= 1;
        }
        self.sizing.surplus.store(excess, Ordering::Release);
        debug!(maximum = size, pending_retirements = excess, "maximum pool size changed");
    }

    fn create_threads(&self, count: usize) -> usize {
        if self.shutdown.load(Ordering::Acquire) {
            return 0;
        }
        let room = self.maximum_pool_size().saturating_sub(self.pool_size());
        let grow = room.min(count);
        if grow > 0 {
            self.permits.add_permits(grow);
            self.sizing.pool_size.fetch_add(grow, Ordering::AcqRel);
        }
        grow
    }
}

impl Drop for TokioThreadPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
