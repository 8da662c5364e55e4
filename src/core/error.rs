//! Error types for queue, pool, and manager operations.

use thiserror::Error;

/// Errors surfaced to producers enqueueing into a sink.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// Not enough room for the elements, counting outstanding reservations.
    #[error("sink full: {0}")]
    Full(String),
    /// The prepared enqueue was already committed or aborted.
    #[error("prepared enqueue has already been processed")]
    AlreadyResolved,
    /// The sink was closed; producers must stop.
    #[error("sink closed")]
    Closed,
}

/// Errors produced by thread pools when accepting work.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// No worker became available within the block timeout.
    #[error("thread pool exhausted: no worker available")]
    Exhausted,
    /// The pool has been shut down.
    #[error("thread pool has been shut down")]
    Shutdown,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The OS refused to spawn a thread.
    #[error("failed to spawn thread: {0}")]
    Spawn(String),
}

/// Errors produced by thread managers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManagerError {
    /// `register`/`deregister` called before `initialize`.
    #[error("thread manager must be initialized first")]
    NotInitialized,
    /// `initialize` called without a thread pool.
    #[error("no thread pool set")]
    NoThreadPool,
    /// The thread pool can only be set once.
    #[error("thread pool can only be set once")]
    ThreadPoolAlreadySet,
    /// The manager has been disposed.
    #[error("thread manager has been disposed")]
    Disposed,
    /// Failure from the underlying pool.
    #[error(transparent)]
    Pool(#[from] PoolError),
    /// Manager configuration was rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Input could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
    /// A value failed validation.
    #[error("invalid value for `{key}`: {reason}")]
    Invalid {
        /// Offending key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// Application-facing result using anyhow for handlers and commands.
pub type AppResult<T> = Result<T, anyhow::Error>;
