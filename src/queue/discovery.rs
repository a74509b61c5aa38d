//! Registration of queue factories for discovery
//!
//! Backends use the `queue_factory!` macro to register a constructor. The
//! queue manager instantiates every registered constructor the first time it
//! resolves a scheme.

use crate::queue::error::QueueResult;
use crate::queue::traits::QueueFactory;

/// Entry for a queue factory in the discovery registry
pub struct QueueFactoryEntry {
    pub name: &'static str,
    pub factory: fn() -> QueueResult<Box<dyn QueueFactory>>,
}

inventory::collect!(QueueFactoryEntry);

/// Macro for registering queue factories
#[macro_export]
macro_rules! queue_factory {
    ($name:expr, $factory_expr:expr) => {
        inventory::submit!($crate::queue::discovery::QueueFactoryEntry {
            name: $name,
            factory: $factory_expr
        });
    };
}

/// Get all registered queue factory entries
pub fn registered_queue_factories() -> Vec<&'static QueueFactoryEntry> {
    inventory::iter::<QueueFactoryEntry>().collect()
}
