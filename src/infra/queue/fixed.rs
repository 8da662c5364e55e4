//! Fixed-size queue backed by a circular buffer.

use crate::core::ConfigError;

use super::buffered::{Buffer, BufferedQueue};

/// Circular buffer with a capacity fixed at construction.
///
/// `start` and `end` wrap modulo capacity; the buffer never grows.
pub struct RingBuffer<T> {
    slots: Vec<Option<T>>,
    start: usize,
    end: usize,
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Allocate `capacity` empty slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            start: 0,
            end: 0,
            len: 0,
        }
    }

    /// Slot count.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

impl<T: Send> Buffer<T> for RingBuffer<T> {
    fn len(&self) -> usize {
        self.len
    }

    fn push(&mut self, element: T) {
        if self.len == self.capacity() {
            return;
        }
        self.slots[self.end] = Some(element);
        self.end = (self.end + 1) % self.capacity();
        self.len += 1;
    }

    fn pop(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        let element = self.slots[self.start].take();
        self.start = (self.start + 1) % self.capacity();
        self.len -= 1;
        element
    }
}

/// Bounded queue whose capacity is exactly the configured size.
pub type FixedSizeQueue<T> = BufferedQueue<T, RingBuffer<T>>;

impl<T: Send> BufferedQueue<T, RingBuffer<T>> {
    /// Create a fixed-size queue holding at most `size` elements.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` when `size` is zero; a fixed-size queue
    /// cannot be unbounded.
    pub fn with_capacity(size: usize) -> Result<Self, ConfigError> {
        if size < 1 {
            return Err(ConfigError::invalid(
                "capacity",
                "a fixed-size queue needs a capacity of at least 1",
            ));
        }
        Ok(Self::with_buffer(RingBuffer::new(size), Some(size)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{QueueSize, Sink, SinkError, Source};

    #[test]
    fn test_ring_buffer_wraps() {
        let mut ring = RingBuffer::new(3);
        ring.push(1);
        ring.push(2);
        ring.push(3);
        assert_eq!(ring.pop(), Some(1));
        ring.push(4);
        assert_eq!(ring.end, 1);
        assert_eq!(ring.pop(), Some(2));
        assert_eq!(ring.pop(), Some(3));
        assert_eq!(ring.pop(), Some(4));
        assert_eq!(ring.pop(), None);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_ring_buffer_refuses_overflow() {
        let mut ring = RingBuffer::new(1);
        ring.push("a");
        ring.push("b");
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.pop(), Some("a"));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(FixedSizeQueue::<u32>::with_capacity(0).is_err());
    }

    #[test]
    fn test_capacity_is_exact() {
        let queue = FixedSizeQueue::with_capacity(2).unwrap();
        assert_eq!(queue.max_size(), Some(2));
        queue.enqueue('a').unwrap();
        queue.enqueue('b').unwrap();
        assert!(queue.is_full());
        assert!(matches!(queue.enqueue('c'), Err(SinkError::Full(_))));
        assert_eq!(queue.dequeue(), Some('a'));
        queue.enqueue('c').unwrap();
        assert_eq!(queue.dequeue_all(), vec!['b', 'c']);
    }

    #[test]
    fn test_wraparound_keeps_fifo() {
        let queue = FixedSizeQueue::with_capacity(3).unwrap();
        for round in 0..10u32 {
            queue.enqueue_batch(vec![round * 2, round * 2 + 1]).unwrap();
            assert_eq!(queue.dequeue_n(2), vec![round * 2, round * 2 + 1]);
        }
        assert_eq!(queue.size(), 0);
    }
}
