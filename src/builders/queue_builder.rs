//! Builders to construct queues and thread managers from configuration.

use std::collections::HashMap;
use std::sync::Arc;

use crate::config::{EventConfig, QueueConfig, QueueKind};
use crate::core::{ConfigError, Queue};
use crate::infra::queue::{DefaultQueue, FixedSizeQueue};

#[cfg(not(target_arch = "wasm32"))]
use crate::core::{ManagerError, TpcThreadManager};

/// Build one queue from its configuration.
///
/// # Errors
///
/// `ConfigError::Invalid` when the configuration does not validate.
pub fn build_queue<T>(cfg: &QueueConfig) -> Result<Arc<dyn Queue<T>>, ConfigError>
where
    T: Send + 'static,
{
    cfg.validate()?;
    let queue: Arc<dyn Queue<T>> = match cfg.kind {
        QueueKind::Default => Arc::new(DefaultQueue::new(cfg.capacity)),
        QueueKind::FixedSize => {
            let capacity = usize::try_from(cfg.capacity)
                .map_err(|e| ConfigError::invalid("capacity", e.to_string()))?;
            Arc::new(FixedSizeQueue::with_capacity(capacity)?)
        }
    };
    queue.set_timeout(cfg.timeout_ms);
    Ok(queue)
}

/// Build every configured queue, keyed by name.
///
/// # Errors
///
/// The first validation failure across the whole configuration.
pub fn build_queues<T>(cfg: &EventConfig) -> Result<HashMap<String, Arc<dyn Queue<T>>>, ConfigError>
where
    T: Send + 'static,
{
    cfg.validate()?;
    cfg.queues
        .iter()
        .map(|(name, queue_cfg)| build_queue(queue_cfg).map(|queue| (name.clone(), queue)))
        .collect()
}

/// Start the self-sizing thread manager described by the configuration.
///
/// # Errors
///
/// `ManagerError::Config` for invalid settings, `ManagerError::Pool` when
/// threads could not be started.
#[cfg(not(target_arch = "wasm32"))]
pub fn build_thread_manager(cfg: &EventConfig) -> Result<TpcThreadManager, ManagerError> {
    TpcThreadManager::new(cfg.thread_manager.clone())
}
