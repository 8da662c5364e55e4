//! Event pipelines: sources paired with a single handler, and the runner
//! that drains them on a pool thread.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{error, trace};

use crate::core::{AppResult, Source};

/// Consumes events drained from a pipeline's sources.
pub trait EventHandler<T>: Send + Sync {
    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Any error is logged by the pipeline runner and otherwise ignored.
    fn handle_event(&self, event: T) -> AppResult<()>;

    /// Handle a drained batch. Defaults to handling each event in order and
    /// stopping at the first error.
    ///
    /// # Errors
    ///
    /// The first error returned by [`handle_event`](Self::handle_event).
    fn handle_events(&self, events: Vec<T>) -> AppResult<()> {
        for event in events {
            self.handle_event(event)?;
        }
        Ok(())
    }
}

/// Adapts a batch closure into an [`EventHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    /// Wrap `f`, which receives each drained batch.
    pub const fn new<T>(f: F) -> Self
    where
        F: Fn(Vec<T>) -> AppResult<()> + Send + Sync,
    {
        Self { f }
    }
}

impl<T, F> EventHandler<T> for FnHandler<F>
where
    F: Fn(Vec<T>) -> AppResult<()> + Send + Sync,
{
    fn handle_event(&self, event: T) -> AppResult<()> {
        (self.f)(vec![event])
    }

    fn handle_events(&self, events: Vec<T>) -> AppResult<()> {
        (self.f)(events)
    }
}

/// One or more event sources feeding exactly one handler.
pub trait EventPipeline: Send + Sync {
    /// Element type carried by the sources.
    type Element: Send + 'static;

    /// Sources drained in order on each pass.
    fn sources(&self) -> &[Arc<dyn Source<Self::Element>>];

    /// The handler receiving every drained batch.
    fn handler(&self) -> &dyn EventHandler<Self::Element>;
}

/// Immutable pairing of sources and a handler.
pub struct SimplePipeline<T> {
    name: String,
    sources: Vec<Arc<dyn Source<T>>>,
    handler: Arc<dyn EventHandler<T>>,
}

impl<T: Send + 'static> SimplePipeline<T> {
    /// Build a pipeline; `name` only appears in logs.
    pub fn new(
        name: impl Into<String>,
        sources: Vec<Arc<dyn Source<T>>>,
        handler: Arc<dyn EventHandler<T>>,
    ) -> Self {
        Self {
            name: name.into(),
            sources,
            handler,
        }
    }

    /// Pipeline name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T: Send + 'static> EventPipeline for SimplePipeline<T> {
    type Element = T;

    fn sources(&self) -> &[Arc<dyn Source<T>>] {
        &self.sources
    }

    fn handler(&self) -> &dyn EventHandler<T> {
        self.handler.as_ref()
    }
}

/// Type-erased unit of work a thread manager submits each pass.
pub trait PipelineTask: Send + Sync {
    /// Drain every source once and dispatch to the handler.
    fn run(&self);
}

/// Drains a pipeline's sources and hands each batch to its handler.
///
/// Handler errors and panics are caught and logged here, the only place they
/// can be observed, so one failing pipeline never takes down the scheduler.
pub struct PipelineRunner<P: ?Sized> {
    pipeline: Arc<P>,
    label: String,
}

impl<P> PipelineRunner<P>
where
    P: EventPipeline + ?Sized,
{
    /// Wrap `pipeline`; `label` identifies it in log output.
    pub fn new(pipeline: Arc<P>, label: impl Into<String>) -> Self {
        Self {
            pipeline,
            label: label.into(),
        }
    }
}

impl<P> PipelineTask for PipelineRunner<P>
where
    P: EventPipeline + ?Sized,
{
    fn run(&self) {
        let handler = self.pipeline.handler();
        for (index, source) in self.pipeline.sources().iter().enumerate() {
            let events = source.dequeue_all();
            trace!(pipeline = %self.label, source = index, count = events.len(), "dispatching events");
            match catch_unwind(AssertUnwindSafe(|| handler.handle_events(events))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!(
                        pipeline = %self.label,
                        source = index,
                        error = %e,
                        "exception processing event pipeline"
                    );
                }
                Err(panic) => {
                    error!(
                        pipeline = %self.label,
                        source = index,
                        panic = %panic_message(panic.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
