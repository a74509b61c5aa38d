//! Queue backend contract
//!
//! A backend is reached through a [`QueueFactory`] registered for a URI scheme.
//! Every queue supports enqueue, dequeue with a timeout, acknowledge and
//! release. Creating, dropping and purging are optional capabilities that a
//! backend exposes by returning `Some` from the matching `as_*` accessor.

use crate::queue::error::QueueResult;
use crate::queue::uri::QueueUri;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Opaque receipt identifying a dequeued message until it is acknowledged or released
pub type ReceiptToken = u64;

/// Raw payload handed out by [`Queue::dequeue`]
#[derive(Debug, Clone, PartialEq)]
pub struct ReceivedMessage {
    pub payload: Vec<u8>,
    pub token: ReceiptToken,
}

pub trait Queue: Send + Sync {
    fn uri(&self) -> &QueueUri;

    /// Short backend name used in diagnostics
    fn queue_type(&self) -> &str;

    fn enqueue(&self, message_id: Uuid, payload: &[u8]) -> QueueResult<()>;

    /// Wait up to `timeout` for a message; `Ok(None)` when nothing arrived
    fn dequeue(&self, timeout: Duration) -> QueueResult<Option<ReceivedMessage>>;

    /// Permanently remove a dequeued message
    fn acknowledge(&self, token: ReceiptToken) -> QueueResult<()>;

    /// Return a dequeued message so it can be received again
    fn release(&self, token: ReceiptToken) -> QueueResult<()>;

    fn is_empty(&self) -> QueueResult<bool>;

    /// Wake any thread blocked in `dequeue` on this instance and stop further waits
    fn interrupt(&self) {}

    /// Allow blocking waits again after an `interrupt`
    fn resume(&self) {}

    fn as_create(&self) -> Option<&dyn CreateQueue> {
        None
    }

    fn as_drop(&self) -> Option<&dyn DropQueue> {
        None
    }

    fn as_purge(&self) -> Option<&dyn PurgeQueue> {
        None
    }
}

pub trait CreateQueue {
    fn create(&self) -> QueueResult<()>;
}

pub trait DropQueue {
    fn drop_queue(&self) -> QueueResult<()>;
}

pub trait PurgeQueue {
    fn purge(&self) -> QueueResult<()>;
}

/// Constructs queues for one URI scheme
pub trait QueueFactory: Send + Sync {
    /// Lower-case scheme this factory serves, e.g. `memory`
    fn scheme(&self) -> &str;

    fn can_create(&self, uri: &QueueUri) -> bool {
        uri.scheme() == self.scheme()
    }

    fn create(&self, uri: &QueueUri) -> QueueResult<Arc<dyn Queue>>;
}
