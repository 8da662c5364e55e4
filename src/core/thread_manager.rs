//! Thread managers: periodic scheduling of registered pipelines onto threads.
//!
//! A manager owns a scheduler loop running on its own named thread. Every
//! pass it hands one runner per registered pipeline to a thread pool, then
//! sleeps for the configured interval. The loop stops when the last pipeline
//! is deregistered and restarts on the next registration.
//!
//! | Manager | Threads |
//! |---------|---------|
//! | [`PooledThreadManager`] | any [`ThreadPool`](crate::core::ThreadPool) set once before `initialize` |
//! | [`TpcThreadManager`] | its own pool of `processors * threads_per_processor + 1` workers |
//! | [`TpspThreadManager`] | a fresh detached thread per pipeline per pass |

mod pooled;
#[cfg(not(target_arch = "wasm32"))]
mod tpc;
mod tpsp;

use std::sync::Arc;

use crate::core::{EventPipeline, ManagerError};

/// Registry of pipelines scheduled onto threads.
///
/// Pipelines are identified by their `Arc` allocation, so registering the
/// same `Arc` twice is a no-op and deregistering needs the same `Arc`.
pub trait ThreadManager {
    /// Start scheduling `pipeline`, restarting the scheduler loop if it was idle.
    ///
    /// # Errors
    ///
    /// `ManagerError::NotInitialized` before initialization,
    /// `ManagerError::Disposed` after disposal, or a pool error when the
    /// scheduler thread could not be started.
    fn register<P>(&self, pipeline: Arc<P>) -> Result<(), ManagerError>
    where
        P: EventPipeline + ?Sized + 'static;

    /// Stop scheduling `pipeline`. Removing the last one stops the loop.
    ///
    /// # Errors
    ///
    /// `ManagerError::NotInitialized` before initialization,
    /// `ManagerError::Disposed` after disposal.
    fn deregister<P>(&self, pipeline: &Arc<P>) -> Result<(), ManagerError>
    where
        P: EventPipeline + ?Sized + 'static;

    /// Remove every pipeline, stop the loop and wait briefly for runs in flight.
    fn deregister_all(&self);
}

/// Lifecycle of a thread manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    /// Created, no scheduling yet.
    Uninitialized,
    /// Initialized; the loop is being started.
    Initialized,
    /// Scheduler loop active.
    Running,
    /// Initialized, loop stopped because nothing is registered.
    Idle,
    /// Disposed; all further registration is refused.
    Disposed,
}

/// Identity of a registered pipeline: the address of its allocation.
pub(crate) fn pipeline_key<P: ?Sized>(pipeline: &Arc<P>) -> usize {
    Arc::as_ptr(pipeline).cast::<()>().addr()
}

pub use pooled::PooledThreadManager;
#[cfg(not(target_arch = "wasm32"))]
pub use tpc::TpcThreadManager;
pub use tpsp::TpspThreadManager;
