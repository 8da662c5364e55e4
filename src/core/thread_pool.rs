//! Thread pool abstraction used by thread managers to run pipeline passes.
//!
//! The pool is an external collaborator: managers only need to hand it a job
//! and get back a handle they can join with a bounded wait. Pool sizing
//! queries and mutators exist for the elastic interceptor.
//!
//! # Example
//!
//! ```rust,ignore
//! use prometheus_event_stage::config::ThreadPoolConfig;
//! use prometheus_event_stage::core::{ThreadPool, WorkerThreadPool};
//! use std::time::Duration;
//!
//! let pool = WorkerThreadPool::new(
//!     ThreadPoolConfig::new()
//!         .with_min_threads(2)
//!         .with_max_threads(4)
//!         .with_block_timeout_ms(250),
//! )?;
//!
//! let handle = pool.execute(Box::new(|| println!("drained")))?;
//! assert!(handle.join(Duration::from_secs(1)));
//! ```

#[cfg(not(target_arch = "wasm32"))]
mod native;

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::core::PoolError;

/// A unit of work handed to a pool.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Worker pool accepting jobs and exposing its sizing.
pub trait ThreadPool: Send + Sync {
    /// Run `job` on a pool thread.
    ///
    /// # Errors
    ///
    /// `PoolError::Exhausted` when no thread became available in time,
    /// `PoolError::Shutdown` once the pool is closed.
    fn execute(&self, job: Job) -> Result<TaskHandle, PoolError>;

    /// Threads currently alive.
    fn pool_size(&self) -> usize;

    /// Floor the pool never shrinks below.
    fn minimum_pool_size(&self) -> usize;

    /// Ceiling for growth.
    fn maximum_pool_size(&self) -> usize;

    /// Change the ceiling; surplus threads retire once idle.
    fn set_maximum_pool_size(&self, size: usize);

    /// Start up to `count` extra threads within the ceiling; returns how many started.
    fn create_threads(&self, count: usize) -> usize;
}

/// Completion latch shared between a running job and whoever submitted it.
#[derive(Debug)]
struct Completion {
    done: Mutex<bool>,
    signal: Condvar,
}

/// Handle to a submitted job.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: u64,
    completion: Arc<Completion>,
}

impl TaskHandle {
    /// A handle whose job has not finished yet.
    #[must_use]
    pub fn pending(id: u64) -> Self {
        Self {
            id,
            completion: Arc::new(Completion {
                done: Mutex::new(false),
                signal: Condvar::new(),
            }),
        }
    }

    /// Job identifier assigned by the pool.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Mark the job finished and wake joiners. Pool implementations call this
    /// once the job returned or unwound.
    pub fn complete(&self) {
        let mut done = self.completion.done.lock();
        *done = true;
        self.completion.signal.notify_all();
    }

    /// Whether the job has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        *self.completion.done.lock()
    }

    /// Wait at most `timeout` for the job; `true` when it finished.
    #[must_use]
    pub fn join(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut done = self.completion.done.lock();
        while !*done {
            if self
                .completion
                .signal
                .wait_until(&mut done, deadline)
                .timed_out()
            {
                return *done;
            }
        }
        true
    }
}

/// Statistics about pool utilization.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Threads currently alive.
    pub pool_size: usize,
    /// Current growth ceiling.
    pub maximum_pool_size: usize,
    /// Jobs currently running.
    pub active_tasks: u64,
    /// Jobs that returned normally.
    pub completed_tasks: u64,
    /// Jobs that panicked.
    pub failed_tasks: u64,
    /// Submissions refused for lack of a free thread.
    pub rejected_tasks: u64,
}

/// Internal counters for pool statistics (thread-safe).
#[derive(Debug, Default)]
pub(crate) struct PoolCounters {
    pub active_tasks: AtomicU64,
    pub completed_tasks: AtomicU64,
    pub failed_tasks: AtomicU64,
    pub rejected_tasks: AtomicU64,
}

impl PoolCounters {
    /// Get a snapshot of current statistics.
    pub fn snapshot(&self, pool_size: usize, maximum_pool_size: usize) -> PoolStats {
        PoolStats {
            pool_size,
            maximum_pool_size,
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            completed_tasks: self.completed_tasks.load(Ordering::Relaxed),
            failed_tasks: self.failed_tasks.load(Ordering::Relaxed),
            rejected_tasks: self.rejected_tasks.load(Ordering::Relaxed),
        }
    }
}

/// Atomically take one thread slot out of the pool if it is above its ceiling.
pub(crate) fn try_retire(pool_size: &AtomicUsize, maximum: &AtomicUsize, minimum: usize) -> bool {
    let mut current = pool_size.load(Ordering::Acquire);
    loop {
        if current <= minimum || current <= maximum.load(Ordering::Acquire) {
            return false;
        }
        match pool_size.compare_exchange_weak(
            current,
            current - 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return true,
            Err(actual) => current = actual,
        }
    }
}

/// Atomically claim one thread slot if the pool is below its ceiling.
pub(crate) fn try_grow(pool_size: &AtomicUsize, maximum: &AtomicUsize) -> bool {
    let mut current = pool_size.load(Ordering::Acquire);
    loop {
        if current >= maximum.load(Ordering::Acquire) {
            return false;
        }
        match pool_size.compare_exchange_weak(
            current,
            current + 1,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => return true,
            Err(actual) => current = actual,
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use native::WorkerThreadPool;
