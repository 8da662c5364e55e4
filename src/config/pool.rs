//! Queue, thread pool and thread manager configuration structures.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::Parameters;
use crate::core::ConfigError;

/// Queue capacity policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueKind {
    /// Growable buffer, unbounded unless a capacity is given.
    #[default]
    Default,
    /// Circular buffer with a fixed capacity.
    FixedSize,
}

/// Queue configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Capacity policy.
    #[serde(default)]
    pub kind: QueueKind,
    /// Maximum elements; `<= 0` means unbounded for the default policy.
    #[serde(default = "default_capacity")]
    pub capacity: i64,
    /// Dequeue lock timeout in milliseconds; `<= 0` never blocks.
    #[serde(default)]
    pub timeout_ms: i64,
}

const fn default_capacity() -> i64 {
    -1
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            kind: QueueKind::Default,
            capacity: default_capacity(),
            timeout_ms: 0,
        }
    }
}

impl QueueConfig {
    /// Validate queue configuration values.
    ///
    /// # Errors
    ///
    /// A fixed-size queue needs a capacity of at least one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kind == QueueKind::FixedSize && self.capacity < 1 {
            return Err(ConfigError::invalid(
                "capacity",
                "fixed_size queues need a capacity of at least 1",
            ));
        }
        Ok(())
    }
}

/// Worker thread pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreadPoolConfig {
    /// Threads started up front; the pool never shrinks below this.
    pub min_threads: usize,
    /// Initial growth ceiling.
    pub max_threads: usize,
    /// How long `execute` waits for an idle worker, in milliseconds; 0 never waits.
    pub block_timeout_ms: u64,
    /// Idle interval after which a worker above the ceiling retires.
    pub keep_alive_ms: u64,
    /// Worker thread name prefix.
    pub thread_name_prefix: String,
    /// Worker stack size in bytes.
    pub thread_stack_size: usize,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        let cpus = num_cpus::get().max(1);
        Self {
            min_threads: 1,
            max_threads: cpus,
            block_timeout_ms: 1000,
            keep_alive_ms: 5000,
            thread_name_prefix: "event-worker".into(),
            thread_stack_size: 2 * 1024 * 1024,
        }
    }
}

impl ThreadPoolConfig {
    /// Defaults: one thread up front, growth up to the CPU count.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of threads started up front.
    #[must_use]
    pub const fn with_min_threads(mut self, count: usize) -> Self {
        self.min_threads = count;
        self
    }

    /// Set the growth ceiling.
    #[must_use]
    pub const fn with_max_threads(mut self, count: usize) -> Self {
        self.max_threads = count;
        self
    }

    /// Set the submission block timeout.
    #[must_use]
    pub const fn with_block_timeout_ms(mut self, millis: u64) -> Self {
        self.block_timeout_ms = millis;
        self
    }

    /// Set the idle keep-alive interval.
    #[must_use]
    pub const fn with_keep_alive_ms(mut self, millis: u64) -> Self {
        self.keep_alive_ms = millis;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Validate pool configuration values.
    ///
    /// # Errors
    ///
    /// Rejects a zero ceiling, a floor above the ceiling, or a zero keep-alive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 {
            return Err(ConfigError::invalid("max_threads", "must be greater than 0"));
        }
        if self.min_threads > self.max_threads {
            return Err(ConfigError::invalid("min_threads", "must not exceed max_threads"));
        }
        if self.keep_alive_ms == 0 {
            return Err(ConfigError::invalid("keep_alive_ms", "must be greater than 0"));
        }
        Ok(())
    }
}

/// Self-sizing thread manager configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadManagerConfig {
    /// Processor count used to size the pool.
    #[serde(default = "default_processors")]
    pub processors: usize,
    /// Threads per processor.
    #[serde(default = "default_threads_per_processor")]
    pub threads_per_processor: usize,
    /// Pause between scheduling passes, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub sleep_time_ms: u64,
    /// How long a submission waits for a free worker, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub block_timeout_ms: u64,
}

fn default_processors() -> usize {
    num_cpus::get().max(1)
}

const fn default_threads_per_processor() -> usize {
    1
}

const fn default_interval_ms() -> u64 {
    1000
}

impl Default for ThreadManagerConfig {
    fn default() -> Self {
        Self {
            processors: default_processors(),
            threads_per_processor: default_threads_per_processor(),
            sleep_time_ms: default_interval_ms(),
            block_timeout_ms: default_interval_ms(),
        }
    }
}

impl ThreadManagerConfig {
    /// Parameter name for the processor count.
    pub const PROCESSORS: &'static str = "processors";
    /// Parameter name for threads per processor.
    pub const THREADS_PER_PROCESSOR: &'static str = "threads-per-processor";
    /// Parameter name for the scheduling interval.
    pub const SLEEP_TIME: &'static str = "sleep-time";
    /// Parameter name for the submission block timeout.
    pub const BLOCK_TIMEOUT: &'static str = "block-timeout";

    /// Worker count for the self-sizing pool: one per processor thread plus one.
    #[must_use]
    pub const fn pool_size(&self) -> usize {
        self.processors
            .saturating_mul(self.threads_per_processor)
            .saturating_add(1)
    }

    /// Pool configuration derived from these settings.
    #[must_use]
    pub fn thread_pool_config(&self) -> ThreadPoolConfig {
        let size = self.pool_size();
        ThreadPoolConfig::new()
            .with_min_threads(size)
            .with_max_threads(size)
            .with_block_timeout_ms(self.block_timeout_ms)
            .with_thread_name_prefix("event-tpc")
    }

    /// Validate manager configuration values.
    ///
    /// # Errors
    ///
    /// Processor and thread counts must be at least one, and the derived
    /// pool size must fit in a `usize`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.processors == 0 {
            return Err(ConfigError::invalid(Self::PROCESSORS, "must be at least 1"));
        }
        if self.threads_per_processor == 0 {
            return Err(ConfigError::invalid(
                Self::THREADS_PER_PROCESSOR,
                "must be at least 1",
            ));
        }
        if self
            .processors
            .checked_mul(self.threads_per_processor)
            .and_then(|n| n.checked_add(1))
            .is_none()
        {
            return Err(ConfigError::invalid(
                Self::THREADS_PER_PROCESSOR,
                "processors * threads-per-processor overflows the pool size",
            ));
        }
        Ok(())
    }

    /// Read settings from generic parameters. Missing keys take defaults;
    /// processor and thread counts are floored at one.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` when a present value does not parse.
    pub fn from_parameters(params: &Parameters) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let processors: i64 = params.get_parsed_or(Self::PROCESSORS, to_i64(defaults.processors))?;
        let threads: i64 = params.get_parsed_or(
            Self::THREADS_PER_PROCESSOR,
            to_i64(defaults.threads_per_processor),
        )?;
        Ok(Self {
            processors: floor_at_one(processors),
            threads_per_processor: floor_at_one(threads),
            sleep_time_ms: params.get_parsed_or(Self::SLEEP_TIME, defaults.sleep_time_ms)?,
            block_timeout_ms: params.get_parsed_or(Self::BLOCK_TIMEOUT, defaults.block_timeout_ms)?,
        })
    }

    /// Read settings from `EVENT_*` environment variables, loading `.env` first.
    ///
    /// # Errors
    ///
    /// `ConfigError::Invalid` when a variable is set but does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let params: Parameters = [
            (Self::PROCESSORS, "EVENT_PROCESSORS"),
            (Self::THREADS_PER_PROCESSOR, "EVENT_THREADS_PER_PROCESSOR"),
            (Self::SLEEP_TIME, "EVENT_SLEEP_TIME_MS"),
            (Self::BLOCK_TIMEOUT, "EVENT_BLOCK_TIMEOUT_MS"),
        ]
        .into_iter()
        .filter_map(|(key, var)| std::env::var(var).ok().map(|value| (key, value)))
        .collect();
        Self::from_parameters(&params)
    }

    /// Parse from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// `ConfigError::Parse` for malformed input, `ConfigError::Invalid` for bad values.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn floor_at_one(value: i64) -> usize {
    usize::try_from(value.max(1)).unwrap_or(1)
}

/// Root configuration: named queues plus the thread manager.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventConfig {
    /// Map of queue name to configuration.
    #[serde(default)]
    pub queues: HashMap<String, QueueConfig>,
    /// Thread manager settings.
    #[serde(default)]
    pub thread_manager: ThreadManagerConfig,
}

impl EventConfig {
    /// Validate every queue and the thread manager.
    ///
    /// # Errors
    ///
    /// The first invalid entry, with the queue name folded into the key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, queue) in &self.queues {
            queue.validate().map_err(|e| match e {
                ConfigError::Invalid { key, reason } => {
                    ConfigError::invalid(format!("queues.{name}.{key}"), reason)
                }
                other => other,
            })?;
        }
        self.thread_manager.validate()
    }

    /// Parse event configuration from a JSON string and validate.
    ///
    /// # Errors
    ///
    /// `ConfigError::Parse` for malformed input, `ConfigError::Invalid` for bad values.
    pub fn from_json_str(input: &str) -> Result<Self, ConfigError> {
        let cfg: Self =
            serde_json::from_str(input).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
