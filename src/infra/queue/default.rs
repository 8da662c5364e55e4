//! Variable-size queue backed by a growable buffer.

use std::collections::VecDeque;

use super::buffered::BufferedQueue;

/// Queue over a `VecDeque`, unbounded unless a ceiling is configured.
pub type DefaultQueue<T> = BufferedQueue<T, VecDeque<T>>;

impl<T: Send> BufferedQueue<T, VecDeque<T>> {
    /// Create a queue holding at most `size` elements; any `size <= 0` means unbounded.
    #[must_use]
    pub fn new(size: i64) -> Self {
        match usize::try_from(size) {
            Ok(max) if max > 0 => Self::with_buffer(VecDeque::with_capacity(max.min(1024)), Some(max)),
            _ => Self::unbounded(),
        }
    }

    /// Create a queue without a ceiling.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::with_buffer(VecDeque::new(), None)
    }
}

impl<T: Send> Default for BufferedQueue<T, VecDeque<T>> {
    fn default() -> Self {
        Self::unbounded()
    }
}
