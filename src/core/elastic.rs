//! Dequeue interceptor that sizes a thread pool from a queue's backlog.

use std::sync::Arc;

use tracing::debug;

use crate::core::{ConfigError, DequeueInterceptor, NullDequeueInterceptor, Queue, QueueSize, ThreadPool};

/// Grows the pool while a watched queue is above `threshold + margin` and
/// shrinks it back while the queue is below `threshold - margin`.
///
/// Install it on the queue feeding the pipelines whose pool it should size.
/// An interceptor that was already installed stays chained: it runs after
/// this one before a dequeue and ahead of it afterwards.
pub struct ElasticPoolInterceptor {
    pool: Arc<dyn ThreadPool>,
    threshold: usize,
    margin: usize,
    next: Arc<dyn DequeueInterceptor>,
}

impl ElasticPoolInterceptor {
    /// Build an interceptor for `pool`.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` unless `threshold >= minimum` and
    /// `threshold - margin > minimum`, where `minimum` is the pool's floor.
    pub fn new(pool: Arc<dyn ThreadPool>, threshold: usize, margin: usize) -> Result<Self, ConfigError> {
        let minimum = pool.minimum_pool_size();
        if threshold < minimum {
            return Err(ConfigError::invalid(
                "threshold",
                format!("{threshold} is below the pool minimum {minimum}"),
            ));
        }
        if threshold.checked_sub(margin).is_none_or(|low| low <= minimum) {
            return Err(ConfigError::invalid(
                "margin",
                format!("threshold - margin must stay above the pool minimum {minimum}"),
            ));
        }
        Ok(Self {
            pool,
            threshold,
            margin,
            next: Arc::new(NullDequeueInterceptor),
        })
    }

    /// Build an interceptor and install it on `queue`, chaining the one
    /// already there.
    ///
    /// # Errors
    ///
    /// As [`new`](Self::new).
    pub fn install<T>(
        queue: &dyn Queue<T>,
        pool: Arc<dyn ThreadPool>,
        threshold: usize,
        margin: usize,
    ) -> Result<Arc<Self>, ConfigError> {
        let mut interceptor = Self::new(pool, threshold, margin)?;
        interceptor.next = queue.dequeue_interceptor();
        let interceptor = Arc::new(interceptor);
        queue.set_dequeue_interceptor(Arc::clone(&interceptor) as Arc<dyn DequeueInterceptor>);
        Ok(interceptor)
    }

    /// Backlog around which the pool is sized.
    #[must_use]
    pub const fn threshold(&self) -> usize {
        self.threshold
    }

    /// Hysteresis on either side of the threshold.
    #[must_use]
    pub const fn margin(&self) -> usize {
        self.margin
    }
}

impl DequeueInterceptor for ElasticPoolInterceptor {
    fn before(&self, source: &dyn QueueSize) {
        let size = source.size();
        if size > self.threshold + self.margin {
            let grown = self.pool.pool_size() + 1;
            self.pool.set_maximum_pool_size(grown);
            let created = self.pool.create_threads(1);
            debug!(backlog = size, maximum = grown, created, "growing thread pool");
        }
        self.next.before(source);
    }

    fn after(&self, source: &dyn QueueSize) {
        self.next.after(source);
        let size = source.size();
        if size < self.threshold - self.margin {
            let minimum = self.pool.minimum_pool_size();
            let shrunk = self.pool.pool_size().saturating_sub(1).max(minimum);
            if shrunk < self.pool.maximum_pool_size() {
                self.pool.set_maximum_pool_size(shrunk);
                debug!(backlog = size, maximum = shrunk, "shrinking thread pool");
            }
        }
    }
}
