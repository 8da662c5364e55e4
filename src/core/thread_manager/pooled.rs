//! Scheduler loop dispatching pipeline runners to a shared thread pool.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::{
    EventPipeline, ManagerError, PipelineRunner, PipelineTask, PoolError, TaskHandle, ThreadPool,
};

use super::{pipeline_key, ManagerState, ThreadManager};

/// Upper bound on every join performed while stopping.
const JOIN_TIMEOUT: Duration = Duration::from_millis(1000);

struct Registered {
    key: usize,
    runner: Arc<dyn PipelineTask>,
}

struct LoopThread {
    generation: u64,
    handle: JoinHandle<()>,
    done: TaskHandle,
}

struct Registry {
    state: ManagerState,
    pool: Option<Arc<dyn ThreadPool>>,
    pipelines: Vec<Registered>,
    in_flight: Vec<TaskHandle>,
    /// Generation of the loop allowed to run; `None` asks every loop to exit.
    active: Option<u64>,
    next_generation: u64,
    loop_thread: Option<LoopThread>,
}

struct Shared {
    registry: Mutex<Registry>,
    wake: Condvar,
}

/// Completes the loop latch even if the loop unwinds.
struct CompleteOnDrop(TaskHandle);

impl Drop for CompleteOnDrop {
    fn drop(&mut self) {
        self.0.complete();
    }
}

/// Thread manager scheduling pipelines onto an externally supplied pool.
///
/// The pool is set exactly once, then [`initialize`](Self::initialize)
/// starts the scheduler loop on a dedicated thread. Each pass submits one
/// runner per pipeline while holding the registry lock; a pool that cannot
/// take a runner is logged and the pass moves on.
pub struct PooledThreadManager {
    id: Uuid,
    name: String,
    sleep_time: Duration,
    shared: Arc<Shared>,
}

impl PooledThreadManager {
    /// Manager whose loop pauses `sleep_time` between passes.
    #[must_use]
    pub fn new(sleep_time: Duration) -> Self {
        Self::with_name("event-scheduler", sleep_time)
    }

    /// Like [`new`](Self::new), naming the loop thread after `name`.
    #[must_use]
    pub fn with_name(name: impl Into<String>, sleep_time: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            sleep_time,
            shared: Arc::new(Shared {
                registry: Mutex::new(Registry {
                    state: ManagerState::Uninitialized,
                    pool: None,
                    pipelines: Vec::new(),
                    in_flight: Vec::new(),
                    active: None,
                    next_generation: 0,
                    loop_thread: None,
                }),
                wake: Condvar::new(),
            }),
        }
    }

    /// Instance id carried in log fields.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Pause between scheduling passes.
    #[must_use]
    pub const fn sleep_time(&self) -> Duration {
        self.sleep_time
    }

    /// Set the pool runners are submitted to.
    ///
    /// # Errors
    ///
    /// `ManagerError::ThreadPoolAlreadySet` on a second call,
    /// `ManagerError::Disposed` after disposal.
    pub fn set_thread_pool(&self, pool: Arc<dyn ThreadPool>) -> Result<(), ManagerError> {
        let mut registry = self.shared.registry.lock();
        if registry.state == ManagerState::Disposed {
            return Err(ManagerError::Disposed);
        }
        if registry.pool.is_some() {
            return Err(ManagerError::ThreadPoolAlreadySet);
        }
        registry.pool = Some(pool);
        Ok(())
    }

    /// The pool set through [`set_thread_pool`](Self::set_thread_pool).
    #[must_use]
    pub fn thread_pool(&self) -> Option<Arc<dyn ThreadPool>> {
        self.shared.registry.lock().pool.clone()
    }

    /// Start the scheduler loop. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// `ManagerError::NoThreadPool` when no pool was set,
    /// `ManagerError::Disposed` after disposal, or a spawn failure.
    pub fn initialize(&self) -> Result<(), ManagerError> {
        let mut registry = self.shared.registry.lock();
        match registry.state {
            ManagerState::Disposed => Err(ManagerError::Disposed),
            ManagerState::Uninitialized => {
                if registry.pool.is_none() {
                    return Err(ManagerError::NoThreadPool);
                }
                registry.state = ManagerState::Initialized;
                self.start_loop(&mut registry)?;
                info!(manager = %self.id, sleep_time = ?self.sleep_time, "thread manager initialized");
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ManagerState {
        self.shared.registry.lock().state
    }

    /// Whether a scheduler loop is currently active.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.shared.registry.lock().active.is_some()
    }

    /// Number of registered pipelines.
    #[must_use]
    pub fn pipeline_count(&self) -> usize {
        self.shared.registry.lock().pipelines.len()
    }

    /// Deregister everything and refuse further use.
    pub fn dispose(&self) {
        self.deregister_all();
        self.shared.registry.lock().state = ManagerState::Disposed;
        info!(manager = %self.id, "thread manager disposed");
    }

    fn start_loop(&self, registry: &mut Registry) -> Result<(), ManagerError> {
        if registry.active.is_some() {
            return Ok(());
        }
        let Some(pool) = registry.pool.clone() else {
            return Err(ManagerError::NoThreadPool);
        };

        let generation = registry.next_generation;
        registry.next_generation += 1;

        let done = TaskHandle::pending(generation);
        let latch = CompleteOnDrop(done.clone());
        let shared = Arc::clone(&self.shared);
        let sleep_time = self.sleep_time;
        let manager = self.id;

        let handle = thread::Builder::new()
            .name(format!("{}-{generation}", self.name))
            .spawn(move || {
                let _latch = latch;
                scheduler_loop(&shared, pool.as_ref(), generation, sleep_time, manager);
            })
            .map_err(|e| PoolError::Spawn(e.to_string()))?;

        registry.active = Some(generation);
        registry.loop_thread = Some(LoopThread {
            generation,
            handle,
            done,
        });
        registry.state = ManagerState::Running;
        debug!(manager = %self.id, generation, "scheduler loop started");
        Ok(())
    }

    /// Ask the loop to exit and hand back its thread for joining.
    fn stop_loop(&self, registry: &mut Registry) -> Option<LoopThread> {
        registry.active = None;
        self.shared.wake.notify_all();
        registry.loop_thread.take()
    }

    /// Must be called without the registry lock held.
    fn join_loop(&self, thread: LoopThread) {
        if !thread.done.join(JOIN_TIMEOUT) {
            warn!(
                manager = %self.id,
                generation = thread.generation,
                "scheduler loop did not stop in time, detaching"
            );
            return;
        }
        if thread.handle.join().is_err() {
            warn!(manager = %self.id, generation = thread.generation, "scheduler loop panicked");
        } else {
            debug!(manager = %self.id, generation = thread.generation, "scheduler loop stopped");
        }
    }
}

const fn check_ready(state: ManagerState) -> Result<(), ManagerError> {
    match state {
        ManagerState::Uninitialized => Err(ManagerError::NotInitialized),
        ManagerState::Disposed => Err(ManagerError::Disposed),
        _ => Ok(()),
    }
}

impl ThreadManager for PooledThreadManager {
    fn register<P>(&self, pipeline: Arc<P>) -> Result<(), ManagerError>
    where
        P: EventPipeline + ?Sized + 'static,
    {
        let key = pipeline_key(&pipeline);
        let mut registry = self.shared.registry.lock();
        check_ready(registry.state)?;

        if registry.pipelines.iter().any(|r| r.key == key) {
            debug!(manager = %self.id, pipeline = key, "pipeline already registered");
            return Ok(());
        }

        let runner: Arc<dyn PipelineTask> =
            Arc::new(PipelineRunner::new(pipeline, format!("pipeline-{key:x}")));
        registry.pipelines.push(Registered { key, runner });

        if registry.active.is_none() {
            if let Err(e) = self.start_loop(&mut registry) {
                registry.pipelines.pop();
                return Err(e);
            }
        }
        debug!(manager = %self.id, pipelines = registry.pipelines.len(), "pipeline registered");
        Ok(())
    }

    fn deregister<P>(&self, pipeline: &Arc<P>) -> Result<(), ManagerError>
    where
        P: EventPipeline + ?Sized + 'static,
    {
        let key = pipeline_key(pipeline);
        let stopped = {
            let mut registry = self.shared.registry.lock();
            check_ready(registry.state)?;

            let before = registry.pipelines.len();
            registry.pipelines.retain(|r| r.key != key);
            if registry.pipelines.len() == before {
                return Ok(());
            }
            debug!(manager = %self.id, pipelines = registry.pipelines.len(), "pipeline deregistered");

            if registry.pipelines.is_empty() {
                registry.state = ManagerState::Idle;
                self.stop_loop(&mut registry)
            } else {
                None
            }
        };

        if let Some(thread) = stopped {
            self.join_loop(thread);
        }
        Ok(())
    }

    fn deregister_all(&self) {
        let (stopped, in_flight) = {
            let mut registry = self.shared.registry.lock();
            registry.pipelines.clear();
            let stopped = self.stop_loop(&mut registry);
            if matches!(
                registry.state,
                ManagerState::Initialized | ManagerState::Running
            ) {
                registry.state = ManagerState::Idle;
            }
            (stopped, std::mem::take(&mut registry.in_flight))
        };

        if let Some(thread) = stopped {
            self.join_loop(thread);
        }
        for handle in in_flight {
            if !handle.join(JOIN_TIMEOUT) {
                warn!(manager = %self.id, task_id = handle.id(), "pipeline run still in flight after stop");
            }
        }
    }
}

impl std::fmt::Debug for PooledThreadManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let registry = self.shared.registry.lock();
        f.debug_struct("PooledThreadManager")
            .field("id", &self.id)
            .field("state", &registry.state)
            .field("pipelines", &registry.pipelines.len())
            .field("sleep_time", &self.sleep_time)
            .finish_non_exhaustive()
    }
}

fn scheduler_loop(
    shared: &Shared,
    pool: &dyn ThreadPool,
    generation: u64,
    sleep_time: Duration,
    manager: Uuid,
) {
    let mut registry = shared.registry.lock();
    while registry.active == Some(generation) {
        let Registry {
            pipelines,
            in_flight,
            ..
        } = &mut *registry;
        in_flight.retain(|handle| !handle.is_finished());

        for registered in pipelines.iter() {
            let runner = Arc::clone(&registered.runner);
            match pool.execute(Box::new(move || runner.run())) {
                Ok(handle) => in_flight.push(handle),
                Err(e) => {
                    warn!(%manager, pipeline = registered.key, error = %e, "unable to run event pipeline");
                }
            }
        }

        let deadline = Instant::now() + sleep_time;
        while registry.active == Some(generation) {
            if shared.wake.wait_until(&mut registry, deadline).timed_out() {
                break;
            }
        }
    }
    debug!(%manager, generation, "scheduler loop exiting");
}
