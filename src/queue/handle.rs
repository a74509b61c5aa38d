//! Shared handle over a backend queue with its capabilities resolved once

use crate::queue::error::{QueueError, QueueResult};
use crate::queue::traits::{Queue, ReceiptToken, ReceivedMessage};
use crate::queue::uri::QueueUri;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Capability flags looked up when the handle is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueCapabilities {
    pub create: bool,
    pub drop: bool,
    pub purge: bool,
}

/// Cloneable reference to a queue instance
///
/// Clones share the same backend instance; [`QueueHandle::same_instance`]
/// tells whether two handles point at the very same object.
#[derive(Clone)]
pub struct QueueHandle {
    inner: Arc<dyn Queue>,
    capabilities: QueueCapabilities,
}

impl QueueHandle {
    pub fn new(inner: Arc<dyn Queue>) -> Self {
        let capabilities = QueueCapabilities {
            create: inner.as_create().is_some(),
            drop: inner.as_drop().is_some(),
            purge: inner.as_purge().is_some(),
        };
        Self {
            inner,
            capabilities,
        }
    }

    pub fn uri(&self) -> &QueueUri {
        self.inner.uri()
    }

    pub fn capabilities(&self) -> QueueCapabilities {
        self.capabilities
    }

    pub fn same_instance(&self, other: &QueueHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn enqueue(&self, message_id: Uuid, payload: &[u8]) -> QueueResult<()> {
        self.inner.enqueue(message_id, payload)
    }

    pub fn dequeue(&self, timeout: Duration) -> QueueResult<Option<ReceivedMessage>> {
        self.inner.dequeue(timeout)
    }

    pub fn acknowledge(&self, token: ReceiptToken) -> QueueResult<()> {
        self.inner.acknowledge(token)
    }

    pub fn release(&self, token: ReceiptToken) -> QueueResult<()> {
        self.inner.release(token)
    }

    pub fn is_empty(&self) -> QueueResult<bool> {
        self.inner.is_empty()
    }

    pub fn interrupt(&self) {
        self.inner.interrupt();
    }

    pub fn resume(&self) {
        self.inner.resume();
    }

    /// Create the physical queue if the backend can; `Ok(false)` when it cannot
    pub fn attempt_create(&self) -> QueueResult<bool> {
        match self.inner.as_create() {
            Some(capability) => capability.create().map(|_| true),
            None => Ok(false),
        }
    }

    pub fn create(&self) -> QueueResult<()> {
        self.inner
            .as_create()
            .ok_or_else(|| self.not_supported("create"))?
            .create()
    }

    pub fn attempt_drop(&self) -> QueueResult<bool> {
        match self.inner.as_drop() {
            Some(capability) => capability.drop_queue().map(|_| true),
            None => Ok(false),
        }
    }

    pub fn drop_queue(&self) -> QueueResult<()> {
        self.inner
            .as_drop()
            .ok_or_else(|| self.not_supported("drop"))?
            .drop_queue()
    }

    pub fn attempt_purge(&self) -> QueueResult<bool> {
        match self.inner.as_purge() {
            Some(capability) => capability.purge().map(|_| true),
            None => Ok(false),
        }
    }

    pub fn purge(&self) -> QueueResult<()> {
        self.inner
            .as_purge()
            .ok_or_else(|| self.not_supported("purge"))?
            .purge()
    }

    fn not_supported(&self, capability: &str) -> QueueError {
        QueueError::CapabilityNotSupported {
            uri: self.uri().to_string(),
            queue_type: self.inner.queue_type().to_string(),
            capability: capability.to_string(),
        }
    }
}

impl fmt::Debug for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueHandle")
            .field("uri", &self.uri().as_str())
            .field("queue_type", &self.inner.queue_type())
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl fmt::Display for QueueHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.uri())
    }
}
