//! Native implementation of `ThreadPool` using OS threads.
//!
//! Jobs are handed over a zero-capacity crossbeam channel, so a submission
//! only succeeds when a worker is idle and waiting. That is how the pool
//! reports exhaustion: if no worker picks the job up within the block
//! timeout, `execute` fails with `PoolError::Exhausted`.
//!
//! # Design Principles
//!
//! - **No polling on the hot path**: idle workers block in `recv_timeout`
//! - **Elastic**: threads are added by `create_threads` and retire lazily
//!   once idle above the ceiling
//! - **Clean shutdown**: dropping the sender unblocks workers naturally

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ThreadPoolConfig;
use crate::core::pipeline::panic_message;
use crate::core::PoolError;

use super::{try_grow, try_retire, Job, PoolCounters, PoolStats, TaskHandle, ThreadPool};

/// A job travelling to a worker with its completion handle.
struct QueuedJob {
    job: Job,
    handle: TaskHandle,
}

/// State shared by the pool and every worker.
struct PoolShared {
    pool_size: AtomicUsize,
    maximum: AtomicUsize,
    minimum: usize,
    shutdown: AtomicBool,
    counters: PoolCounters,
}

/// Worker pool with dedicated OS threads.
///
/// # Design
///
/// - **Rendezvous hand-off**: `execute` waits at most `block_timeout` for an idle worker
/// - **Lock-free fast path**: atomic counters for sizing and statistics
/// - **Clean shutdown**: dropping the sender ends every worker loop
pub struct WorkerThreadPool {
    /// Pool configuration.
    config: ThreadPoolConfig,

    /// Job sender (to workers). Option allows clean shutdown by dropping.
    job_tx: Mutex<Option<Sender<QueuedJob>>>,

    /// Receiver kept to hand to threads started later.
    job_rx: Receiver<QueuedJob>,

    /// Sizing, shutdown flag and counters.
    shared: Arc<PoolShared>,

    /// Worker thread handles.
    workers: Mutex<Vec<JoinHandle<()>>>,

    /// Worker id counter, used in thread names.
    next_worker_id: AtomicUsize,

    /// Job id counter.
    next_task_id: AtomicU64,
}

impl WorkerThreadPool {
    /// Create a pool and start `config.min_threads` workers.
    ///
    /// # Errors
    ///
    /// `PoolError::InvalidConfig` if the configuration is invalid,
    /// `PoolError::Spawn` if a worker thread could not be started.
    pub fn new(config: ThreadPoolConfig) -> Result<Self, PoolError> {
        config
            .validate()
            .map_err(|e| PoolError::InvalidConfig(e.to_string()))?;

        let (job_tx, job_rx) = bounded::<QueuedJob>(0);
        let shared = Arc::new(PoolShared {
            pool_size: AtomicUsize::new(0),
            maximum: AtomicUsize::new(config.max_threads),
            minimum: config.min_threads,
            shutdown: AtomicBool::new(false),
            counters: PoolCounters::default(),
        });

        let pool = Self {
            config,
            job_tx: Mutex::new(Some(job_tx)),
            job_rx,
            shared,
            workers: Mutex::new(Vec::new()),
            next_worker_id: AtomicUsize::new(0),
            next_task_id: AtomicU64::new(0),
        };

        for _ in 0..pool.config.min_threads {
            pool.shared.pool_size.fetch_add(1, Ordering::AcqRel);
            pool.spawn_worker()?;
        }

        info!(
            min_threads = pool.config.min_threads,
            max_threads = pool.config.max_threads,
            block_timeout_ms = pool.config.block_timeout_ms,
            "WorkerThreadPool initialized"
        );

        Ok(pool)
    }

    /// Get current pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.counters.snapshot(
            self.shared.pool_size.load(Ordering::Relaxed),
            self.shared.maximum.load(Ordering::Relaxed),
        )
    }

    /// Pool configuration.
    #[must_use]
    pub const fn config(&self) -> &ThreadPoolConfig {
        &self.config
    }

    /// Start one worker; the caller has already counted it in `pool_size`.
    fn spawn_worker(&self) -> Result<(), PoolError> {
        let worker_id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let rx = self.job_rx.clone();
        let shared = Arc::clone(&self.shared);
        let keep_alive = Duration::from_millis(self.config.keep_alive_ms);

        let spawned = thread::Builder::new()
            .name(format!("{}-{worker_id}", self.config.thread_name_prefix))
            .stack_size(self.config.thread_stack_size)
            .spawn(move || worker_loop(worker_id, &rx, &shared, keep_alive));

        match spawned {
            Ok(handle) => {
                let mut workers = self.workers.lock();
                workers.retain(|w| !w.is_finished());
                workers.push(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.pool_size.fetch_sub(1, Ordering::AcqRel);
                error!(worker_id, error = %e, "failed to spawn worker thread");
                Err(PoolError::Spawn(e.to_string()))
            }
        }
    }

    /// Shut the pool down, joining each worker for at most two seconds.
    ///
    /// Workers that don't exit in time are detached.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }

        info!("Shutting down worker thread pool");

        // Dropping the sender unblocks every worker waiting in recv.
        self.job_tx.lock().take();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let worker_count = workers.len();

        for (idx, worker) in workers.into_iter().enumerate() {
            let (tx, rx) = std::sync::mpsc::channel();
            let join_thread = thread::spawn(move || {
                let result = worker.join();
                let _ = tx.send(result.is_ok());
            });

            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(true) => debug!(worker = idx, "Worker joined successfully"),
                Ok(false) => warn!(worker = idx, "Worker panicked"),
                Err(_) => warn!(worker = idx, "Worker did not exit within timeout - detaching"),
            }

            drop(join_thread);
        }

        info!(worker_count, "Worker thread pool shut down complete");
    }
}

impl ThreadPool for WorkerThreadPool {
    fn execute(&self, job: Job) -> Result<TaskHandle, PoolError> {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return Err(PoolError::Shutdown);
        }

        // Clone the sender so concurrent submitters don't queue on the mutex
        // while one of them waits out the block timeout.
        let Some(job_tx) = self.job_tx.lock().clone() else {
            return Err(PoolError::Shutdown);
        };

        let handle = TaskHandle::pending(self.next_task_id.fetch_add(1, Ordering::Relaxed));
        let queued = QueuedJob {
            job,
            handle: handle.clone(),
        };

        let block_timeout = Duration::from_millis(self.config.block_timeout_ms);
        let sent = if block_timeout.is_zero() {
            job_tx.try_send(queued).map_err(|e| match e {
                TrySendError::Full(_) => PoolError::Exhausted,
                TrySendError::Disconnected(_) => PoolError::Shutdown,
            })
        } else {
            job_tx.send_timeout(queued, block_timeout).map_err(|e| match e {
                SendTimeoutError::Timeout(_) => PoolError::Exhausted,
                SendTimeoutError::Disconnected(_) => PoolError::Shutdown,
            })
        };

        match sent {
            Ok(()) => {
                debug!(task_id = handle.id(), "job handed to worker");
                Ok(handle)
            }
            Err(e) => {
                if e == PoolError::Exhausted {
                    self.shared.counters.rejected_tasks.fetch_add(1, Ordering::Relaxed);
                }
                Err(e)
            }
        }
    }

    fn pool_size(&self) -> usize {
        self.shared.pool_size.load(Ordering::Acquire)
    }

    fn minimum_pool_size(&self) -> usize {
        self.shared.minimum
    }

    fn maximum_pool_size(&self) -> usize {
        self.shared.maximum.load(Ordering::Acquire)
    }

    fn set_maximum_pool_size(&self, size: usize) {
        let size = size.max(self.shared.minimum).max(1);
        self.shared.maximum.store(size, Ordering::Release);
        debug!(maximum = size, "maximum pool size changed");
    }

    fn create_threads(&self, count: usize) -> usize {
        if self.shared.shutdown.load(Ordering::Acquire) {
            return 0;
        }
        let mut created = 0;
        for _ in 0..count {
            if !try_grow(&self.shared.pool_size, &self.shared.maximum) {
                break;
            }
            if self.spawn_worker().is_err() {
                break;
            }
            created += 1;
        }
        created
    }
}

impl Drop for WorkerThreadPool {
    fn drop(&mut self) {
        // Signal shutdown but don't join workers in Drop; explicit shutdown()
        // is required for graceful cleanup.
        if !self.shared.shutdown.swap(true, Ordering::AcqRel) {
            self.job_tx.lock().take();
            debug!("WorkerThreadPool dropped without explicit shutdown - workers will be detached");
        }
    }
}

fn worker_loop(worker_id: usize, rx: &Receiver<QueuedJob>, shared: &PoolShared, keep_alive: Duration) {
    debug!(worker_id, "Worker thread started");

    loop {
        let queued = match rx.recv_timeout(keep_alive) {
            Ok(queued) => queued,
            Err(RecvTimeoutError::Timeout) => {
                if try_retire(&shared.pool_size, &shared.maximum, shared.minimum) {
                    debug!(worker_id, "Worker retiring above maximum pool size");
                    return;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!(worker_id, "Worker channel closed, exiting");
                break;
            }
        };

        shared.counters.active_tasks.fetch_add(1, Ordering::Relaxed);
        let QueuedJob { job, handle } = queued;
        match catch_unwind(AssertUnwindSafe(job)) {
            Ok(()) => {
                shared.counters.completed_tasks.fetch_add(1, Ordering::Relaxed);
            }
            Err(panic) => {
                shared.counters.failed_tasks.fetch_add(1, Ordering::Relaxed);
                error!(
                    worker_id,
                    task_id = handle.id(),
                    panic = %panic_message(panic.as_ref()),
                    "Job panicked on worker"
                );
            }
        }
        shared.counters.active_tasks.fetch_sub(1, Ordering::Relaxed);
        handle.complete();
    }

    shared.pool_size.fetch_sub(1, Ordering::AcqRel);
    debug!(worker_id, "Worker thread exiting");
}
