//! Shared queue core: lock, reserve accounting, timeout, interceptor.
//!
//! Both capacity policies are this type with a different [`Buffer`].

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard, RwLock};
use tracing::trace;

use crate::core::{
    DequeueInterceptor, NullDequeueInterceptor, PreparedEnqueue, Queue, QueueSize, Reservation,
    Sink, SinkError, Source,
};

/// FIFO element storage used behind the queue lock.
pub trait Buffer<T>: Send {
    /// Stored element count.
    fn len(&self) -> usize;

    /// Whether nothing is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append at the tail. Callers guarantee room.
    fn push(&mut self, element: T);

    /// Remove from the head.
    fn pop(&mut self) -> Option<T>;
}

impl<T: Send> Buffer<T> for VecDeque<T> {
    fn len(&self) -> usize {
        VecDeque::len(self)
    }

    fn push(&mut self, element: T) {
        self.push_back(element);
    }

    fn pop(&mut self) -> Option<T> {
        self.pop_front()
    }
}

/// Elements plus the capacity claimed by pending two-phase enqueues.
struct QueueState<B> {
    elements: B,
    reserve: usize,
}

/// Thread-safe FIFO queue over a [`Buffer`].
///
/// Every structural operation holds the single internal mutex for its whole
/// critical section. Enqueues lock unconditionally; dequeues use a bounded
/// `try_lock_for` so a draining worker is never parked indefinitely.
pub struct BufferedQueue<T, B> {
    state: Mutex<QueueState<B>>,
    max_size: Option<usize>,
    timeout_ms: AtomicI64,
    closed: AtomicBool,
    interceptor: RwLock<Arc<dyn DequeueInterceptor>>,
    _element: PhantomData<fn() -> T>,
}

impl<T, B> BufferedQueue<T, B>
where
    T: Send,
    B: Buffer<T>,
{
    pub(crate) fn with_buffer(elements: B, max_size: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                elements,
                reserve: 0,
            }),
            max_size,
            timeout_ms: AtomicI64::new(0),
            closed: AtomicBool::new(false),
            interceptor: RwLock::new(Arc::new(NullDequeueInterceptor)),
            _element: PhantomData,
        }
    }

    /// Current reserved-but-uncommitted slot count.
    #[must_use]
    pub fn reserved(&self) -> usize {
        self.state.lock().reserve
    }

    fn has_room(&self, state: &QueueState<B>, additional: usize) -> bool {
        self.max_size
            .is_none_or(|max| state.elements.len() + state.reserve + additional <= max)
    }

    fn ensure_open(&self) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        Ok(())
    }

    fn full() -> SinkError {
        SinkError::Full("not enough room to enqueue these elements".into())
    }

    /// Lock for a dequeue, waiting at most the configured timeout.
    fn lock_for_dequeue(&self) -> Option<MutexGuard<'_, QueueState<B>>> {
        let timeout = self.timeout_ms.load(Ordering::Relaxed);
        match u64::try_from(timeout) {
            Ok(ms) if ms > 0 => self.state.try_lock_for(Duration::from_millis(ms)),
            _ => self.state.try_lock(),
        }
    }

    /// Run `take` under the dequeue lock, wrapped by the interceptor hooks.
    fn intercepted<R>(&self, empty: R, take: impl FnOnce(&mut QueueState<B>) -> R) -> R {
        let interceptor = Arc::clone(&*self.interceptor.read());
        interceptor.before(self);
        let taken = match self.lock_for_dequeue() {
            Some(mut state) => take(&mut state),
            None => {
                trace!("dequeue lock not acquired within timeout");
                empty
            }
        };
        interceptor.after(self);
        taken
    }

    fn drain(state: &mut QueueState<B>, count: usize) -> Vec<T> {
        let count = count.min(state.elements.len());
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            if let Some(element) = state.elements.pop() {
                out.push(element);
            }
        }
        out
    }
}

impl<T, B> QueueSize for BufferedQueue<T, B>
where
    T: Send,
    B: Buffer<T>,
{
    fn size(&self) -> usize {
        self.state.lock().elements.len()
    }

    fn max_size(&self) -> Option<usize> {
        self.max_size
    }

    fn can_accept(&self) -> Option<usize> {
        let state = self.state.lock();
        self.max_size
            .map(|max| max.saturating_sub(state.elements.len() + state.reserve))
    }
}

impl<T, B> Sink<T> for BufferedQueue<T, B>
where
    T: Send,
    B: Buffer<T>,
{
    fn enqueue(&self, element: T) -> Result<(), SinkError> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        if !self.has_room(&state, 1) {
            return Err(Self::full());
        }
        state.elements.push(element);
        Ok(())
    }

    fn enqueue_batch(&self, elements: Vec<T>) -> Result<(), SinkError> {
        self.ensure_open()?;
        let mut state = self.state.lock();
        if !self.has_room(&state, elements.len()) {
            return Err(Self::full());
        }
        for element in elements {
            state.elements.push(element);
        }
        Ok(())
    }

    fn try_enqueue(&self, element: T) -> bool {
        self.enqueue(element).is_ok()
    }

    fn prepare_enqueue(&self, elements: Vec<T>) -> Result<PreparedEnqueue<'_, T>, SinkError> {
        self.ensure_open()?;
        {
            let mut state = self.state.lock();
            if !self.has_room(&state, elements.len()) {
                return Err(Self::full());
            }
            state.reserve += elements.len();
        }
        Ok(PreparedEnqueue::new(self, elements))
    }
}

impl<T, B> Reservation<T> for BufferedQueue<T, B>
where
    T: Send,
    B: Buffer<T>,
{
    fn commit_reserved(&self, elements: Vec<T>) -> Result<(), SinkError> {
        let mut state = self.state.lock();
        state.reserve = state.reserve.saturating_sub(elements.len());
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        for element in elements {
            state.elements.push(element);
        }
        Ok(())
    }

    fn release_reserved(&self, count: usize) {
        let mut state = self.state.lock();
        state.reserve = state.reserve.saturating_sub(count);
    }
}

impl<T, B> Source<T> for BufferedQueue<T, B>
where
    T: Send,
    B: Buffer<T>,
{
    fn dequeue(&self) -> Option<T> {
        self.intercepted(None, |state| state.elements.pop())
    }

    fn dequeue_n(&self, count: usize) -> Vec<T> {
        self.intercepted(Vec::new(), |state| Self::drain(state, count))
    }

    fn dequeue_all(&self) -> Vec<T> {
        self.intercepted(Vec::new(), |state| {
            let count = state.elements.len();
            Self::drain(state, count)
        })
    }

    fn set_timeout(&self, millis: i64) {
        self.timeout_ms.store(millis, Ordering::Relaxed);
    }
}

impl<T, B> Queue<T> for BufferedQueue<T, B>
where
    T: Send,
    B: Buffer<T>,
{
    fn set_dequeue_interceptor(&self, interceptor: Arc<dyn DequeueInterceptor>) {
        *self.interceptor.write() = interceptor;
    }

    fn dequeue_interceptor(&self) -> Arc<dyn DequeueInterceptor> {
        Arc::clone(&*self.interceptor.read())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T, B> std::fmt::Debug for BufferedQueue<T, B>
where
    T: Send,
    B: Buffer<T>,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BufferedQueue")
            .field("size", &state.elements.len())
            .field("reserve", &state.reserve)
            .field("max_size", &self.max_size)
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::queue::DefaultQueue;
    use std::time::Instant;

    #[test]
    fn test_dequeue_gives_up_when_lock_is_held() {
        let queue = DefaultQueue::unbounded();
        queue.enqueue_batch(vec![1, 2, 3]).unwrap();

        {
            let _held = queue.state.lock();

            for non_blocking in [0, -5] {
                queue.set_timeout(non_blocking);
                let started = Instant::now();
                assert_eq!(queue.dequeue(), None);
                assert!(queue.dequeue_all().is_empty());
                assert!(started.elapsed() < Duration::from_millis(100));
            }

            queue.set_timeout(150);
            let started = Instant::now();
            assert!(queue.dequeue_n(2).is_empty());
            let waited = started.elapsed();
            assert!(waited >= Duration::from_millis(150));
            assert!(waited < Duration::from_secs(2));
        }

        assert_eq!(queue.dequeue_all(), vec![1, 2, 3]);
    }

    #[test]
    fn test_bounded_wait_succeeds_once_lock_is_released() {
        let queue = Arc::new(DefaultQueue::unbounded());
        queue.enqueue(7).unwrap();
        queue.set_timeout(2_000);

        let held = queue.state.lock();
        let consumer = {
            let queue = Arc::clone(&queue);
            std::thread::spawn(move || queue.dequeue())
        };
        std::thread::sleep(Duration::from_millis(30));
        drop(held);

        assert_eq!(consumer.join().unwrap(), Some(7));
    }
}
