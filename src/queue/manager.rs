//! QueueManager - scheme registry and queue instance cache
//!
//! The manager resolves a URI to the factory registered for its scheme and
//! keeps at most one queue instance per normalised URI. Factory discovery runs
//! once, on first use; callers racing the first lookup wait for that single
//! scan to finish.

use crate::core::sync::{handle_rwlock_read, handle_rwlock_write};
use crate::queue::discovery::registered_queue_factories;
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::handle::QueueHandle;
use crate::queue::traits::QueueFactory;
use crate::queue::uri::{scheme_of, QueueUri};
use std::collections::HashMap;
use std::sync::{Arc, Once, RwLock};

fn lock_error(message: String) -> QueueError {
    QueueError::OperationFailed { message }
}

/// Central queue registry shared by a service bus instance
///
/// # Example
///
/// ```rust
/// use relaybus::queue::api::QueueManager;
///
/// let manager = QueueManager::new();
/// let a = manager.get_queue("memory://docs/Example").unwrap();
/// let b = manager.get_queue("MEMORY://DOCS/example").unwrap();
/// assert!(a.same_instance(&b));
/// ```
pub struct QueueManager {
    discovery: Once,
    factories: RwLock<HashMap<String, Arc<dyn QueueFactory>>>,
    queues: RwLock<HashMap<String, QueueHandle>>,
}

impl QueueManager {
    pub fn new() -> Self {
        Self {
            discovery: Once::new(),
            factories: RwLock::new(HashMap::new()),
            queues: RwLock::new(HashMap::new()),
        }
    }

    fn ensure_discovered(&self) {
        self.discovery.call_once(|| {
            let mut discovered = 0usize;
            let mut factories = match self.factories.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for entry in registered_queue_factories() {
                match (entry.factory)() {
                    Ok(factory) => {
                        let scheme = factory.scheme().to_lowercase();
                        if factories.contains_key(&scheme) {
                            log::debug!(
                                "Queue factory '{}' ignored: scheme '{}' is already registered",
                                entry.name,
                                scheme
                            );
                            continue;
                        }
                        factories.insert(scheme, Arc::from(factory));
                        discovered += 1;
                    }
                    Err(e) => {
                        log::warn!("Could not instantiate queue factory '{}': {}", entry.name, e);
                    }
                }
            }
            log::debug!("Queue factory discovery registered {} factories", discovered);
        });
    }

    /// Install a factory for its scheme, replacing any existing one
    pub fn register_queue_factory(&self, factory: Arc<dyn QueueFactory>) -> QueueResult<()> {
        self.ensure_discovered();
        let scheme = factory.scheme().to_lowercase();
        let mut factories = handle_rwlock_write(self.factories.write(), lock_error)?;
        if factories.insert(scheme.clone(), factory).is_some() {
            log::warn!("Queue factory for scheme '{}' has been replaced", scheme);
        }
        Ok(())
    }

    /// Resolve the factory for a scheme name or a full URI
    pub fn get_queue_factory(&self, scheme_or_uri: &str) -> QueueResult<Arc<dyn QueueFactory>> {
        self.ensure_discovered();
        let scheme = scheme_of(scheme_or_uri).unwrap_or_else(|| scheme_or_uri.trim().to_lowercase());
        let factories = handle_rwlock_read(self.factories.read(), lock_error)?;
        factories
            .get(&scheme)
            .cloned()
            .ok_or_else(|| QueueError::factory_not_found(&scheme))
    }

    pub fn contains_queue_factory(&self, scheme: &str) -> bool {
        self.get_queue_factory(scheme).is_ok()
    }

    /// Return the cached instance for `uri`, creating it on first request
    pub fn get_queue(&self, uri: &str) -> QueueResult<QueueHandle> {
        let parsed = QueueUri::parse(uri)?;
        let key = parsed.normalized().to_string();

        {
            let queues = handle_rwlock_read(self.queues.read(), lock_error)?;
            if let Some(queue) = queues.get(&key) {
                return Ok(queue.clone());
            }
        }

        let mut queues = handle_rwlock_write(self.queues.write(), lock_error)?;
        if let Some(queue) = queues.get(&key) {
            return Ok(queue.clone());
        }
        let queue = self.build(&parsed)?;
        queues.insert(key, queue.clone());
        Ok(queue)
    }

    /// Construct a new, uncached queue instance
    pub fn create_queue(&self, uri: &str) -> QueueResult<QueueHandle> {
        let parsed = QueueUri::parse(uri)?;
        self.build(&parsed)
    }

    fn build(&self, uri: &QueueUri) -> QueueResult<QueueHandle> {
        let factory = self.get_queue_factory(uri.scheme())?;
        if !factory.can_create(uri) {
            return Err(QueueError::invalid_uri(
                uri.as_str(),
                format!("factory for scheme '{}' cannot create this queue", factory.scheme()),
            ));
        }
        let queue = factory.create(uri)?;
        log::debug!("Created queue instance for '{}'", uri);
        Ok(QueueHandle::new(queue))
    }

    /// Attempt to create every given queue on its backend
    ///
    /// Backends without the create capability are skipped.
    pub fn create_physical_queues<'a>(
        &self,
        queues: impl IntoIterator<Item = &'a QueueHandle>,
    ) -> QueueResult<()> {
        for queue in queues {
            if queue.attempt_create()? {
                log::debug!("Ensured physical queue '{}'", queue);
            } else {
                log::debug!("Queue '{}' cannot be created by its backend; skipped", queue);
            }
        }
        Ok(())
    }

    pub fn cached_queue_count(&self) -> usize {
        self.queues.read().map(|queues| queues.len()).unwrap_or(0)
    }

    /// Interrupt every cached queue and clear the cache
    pub fn dispose(&self) -> QueueResult<()> {
        let mut queues = handle_rwlock_write(self.queues.write(), lock_error)?;
        for queue in queues.values() {
            queue.interrupt();
        }
        let count = queues.len();
        queues.clear();
        log::debug!("Queue manager disposed {} cached queues", count);
        Ok(())
    }
}

impl Default for QueueManager {
    fn default() -> Self {
        Self::new()
    }
}
