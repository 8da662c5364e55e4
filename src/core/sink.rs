//! Producer (`Sink`) and consumer (`Source`) capabilities of a queue.
//!
//! A queue implements both views. Producers only ever see the sink side,
//! pipelines only ever drain the source side.

use std::sync::Arc;

use tracing::debug;

use crate::core::SinkError;

/// Size and capacity queries shared by both queue views.
pub trait QueueSize: Send + Sync {
    /// Number of elements visible to consumers.
    fn size(&self) -> usize;

    /// Capacity ceiling, `None` when unbounded.
    fn max_size(&self) -> Option<usize>;

    /// Remaining room after counting outstanding reservations, `None` when unbounded.
    fn can_accept(&self) -> Option<usize>;

    /// Whether a single-element enqueue would currently be refused.
    fn is_full(&self) -> bool {
        matches!(self.can_accept(), Some(0))
    }
}

/// Producer-facing side of a queue.
///
/// Enqueue operations acquire the queue lock unconditionally. Capacity
/// exhaustion is reported to the caller and never swallowed.
pub trait Sink<T>: QueueSize {
    /// Append one element.
    ///
    /// # Errors
    ///
    /// `SinkError::Full` when bounded and out of room, `SinkError::Closed` after close.
    fn enqueue(&self, element: T) -> Result<(), SinkError>;

    /// Append a batch, all or nothing.
    ///
    /// # Errors
    ///
    /// `SinkError::Full` when the whole batch does not fit; the queue is left untouched.
    fn enqueue_batch(&self, elements: Vec<T>) -> Result<(), SinkError>;

    /// Lossy enqueue: `false` instead of an error when the element is refused.
    fn try_enqueue(&self, element: T) -> bool;

    /// Reserve room for a batch without making it visible to consumers.
    ///
    /// # Errors
    ///
    /// Fails before reserving anything when the batch does not fit.
    fn prepare_enqueue(&self, elements: Vec<T>) -> Result<PreparedEnqueue<'_, T>, SinkError>;
}

/// Consumer-facing side of a queue.
///
/// Dequeue operations only wait for the lock, never for data, and the wait
/// is bounded by the configured timeout.
pub trait Source<T>: QueueSize {
    /// Remove the oldest element, `None` when empty or the lock was not obtained in time.
    fn dequeue(&self) -> Option<T>;

    /// Remove up to `count` elements.
    fn dequeue_n(&self, count: usize) -> Vec<T>;

    /// Remove everything currently visible.
    fn dequeue_all(&self) -> Vec<T>;

    /// Lock wait for dequeue operations; values `<= 0` make the attempt non-blocking.
    fn set_timeout(&self, millis: i64);
}

/// Hooks run around every dequeue operation.
pub trait DequeueInterceptor: Send + Sync {
    /// Called before elements are removed.
    fn before(&self, source: &dyn QueueSize);
    /// Called after elements are removed.
    fn after(&self, source: &dyn QueueSize);
}

/// Interceptor that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDequeueInterceptor;

impl DequeueInterceptor for NullDequeueInterceptor {
    fn before(&self, _source: &dyn QueueSize) {}
    fn after(&self, _source: &dyn QueueSize) {}
}

/// A queue: both capabilities plus interceptor and close control.
pub trait Queue<T>: Sink<T> + Source<T> {
    /// Install an interceptor, replacing the current one.
    fn set_dequeue_interceptor(&self, interceptor: Arc<dyn DequeueInterceptor>);

    /// Currently installed interceptor.
    fn dequeue_interceptor(&self) -> Arc<dyn DequeueInterceptor>;

    /// Refuse all further enqueues; consumers may still drain.
    fn close(&self);

    /// Whether [`Queue::close`] was called.
    fn is_closed(&self) -> bool;
}

/// Backing store side of a two-phase enqueue.
///
/// Implemented by queues so a [`PreparedEnqueue`] can settle its reservation.
pub trait Reservation<T>: Send + Sync {
    /// Make reserved elements visible and release their reservation.
    ///
    /// # Errors
    ///
    /// `SinkError::Closed` when the queue closed in the meantime; the
    /// reservation is released regardless.
    fn commit_reserved(&self, elements: Vec<T>) -> Result<(), SinkError>;

    /// Release `count` reserved slots without enqueueing anything.
    fn release_reserved(&self, count: usize);
}

/// A provisional reservation of queue capacity for a batch.
///
/// Exactly one of [`commit`](Self::commit) or [`abort`](Self::abort) settles it;
/// any later call fails with `SinkError::AlreadyResolved`. Dropping a pending
/// reservation aborts it.
pub struct PreparedEnqueue<'a, T> {
    target: &'a dyn Reservation<T>,
    elements: Option<Vec<T>>,
}

impl<'a, T> PreparedEnqueue<'a, T> {
    /// Wrap an already-reserved batch. The caller must have reserved
    /// `elements.len()` slots on `target`.
    pub fn new(target: &'a dyn Reservation<T>, elements: Vec<T>) -> Self {
        Self {
            target,
            elements: Some(elements),
        }
    }

    /// Number of reserved elements, zero once settled.
    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.as_ref().map_or(0, Vec::len)
    }

    /// Whether nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether commit or abort already happened.
    #[must_use]
    pub const fn is_resolved(&self) -> bool {
        self.elements.is_none()
    }

    /// Enqueue the reserved batch.
    ///
    /// # Errors
    ///
    /// `SinkError::AlreadyResolved` on a settled reservation, `SinkError::Closed`
    /// when the queue closed after the reservation was made.
    pub fn commit(&mut self) -> Result<(), SinkError> {
        let elements = self.elements.take().ok_or(SinkError::AlreadyResolved)?;
        self.target.commit_reserved(elements)
    }

    /// Drop the reserved batch and release its capacity.
    ///
    /// # Errors
    ///
    /// `SinkError::AlreadyResolved` on a settled reservation.
    pub fn abort(&mut self) -> Result<(), SinkError> {
        let elements = self.elements.take().ok_or(SinkError::AlreadyResolved)?;
        self.target.release_reserved(elements.len());
        Ok(())
    }
}

impl<T> Drop for PreparedEnqueue<'_, T> {
    fn drop(&mut self) {
        if let Some(elements) = self.elements.take() {
            debug!(count = elements.len(), "pending enqueue dropped, releasing reservation");
            self.target.release_reserved(elements.len());
        }
    }
}

impl<T> std::fmt::Debug for PreparedEnqueue<'_, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedEnqueue")
            .field("pending", &self.len())
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
