//! Public API for the queue abstraction
//!
//! External modules should import from here rather than directly from internal modules.

// Registry and handles
pub use crate::queue::handle::{QueueCapabilities, QueueHandle};
pub use crate::queue::manager::QueueManager;
pub use crate::queue::uri::QueueUri;

// Backend contract
pub use crate::queue::traits::{
    CreateQueue, DropQueue, PurgeQueue, Queue, QueueFactory, ReceiptToken, ReceivedMessage,
};

// Built-in backend
pub use crate::queue::memory::{MemoryQueue, MemoryQueueFactory, MEMORY_SCHEME};

// Error handling
pub use crate::queue::error::{QueueError, QueueResult};
