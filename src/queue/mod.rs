//! Queue abstraction
//!
//! The bus talks to every backend through the [`Queue`] contract. Backends are
//! addressed by URI (`scheme://host/queue-name?option=value`) and constructed by
//! the [`QueueFactory`] registered for the scheme. The [`QueueManager`] owns
//! the scheme registry and caches one instance per normalised URI.
//!
//! ```text
//!  get_queue("Memory://Host/Work")
//!        │
//!        ▼
//! ┌──────────────────────────────┐   miss   ┌─────────────────────┐
//! │ QueueManager (uri cache)     │ ───────► │ QueueFactory        │
//! │  "memory://host/work" ──► H  │ ◄─────── │  (scheme "memory")  │
//! └──────────────────────────────┘  handle  └─────────────────────┘
//! ```

pub mod api;
pub mod discovery;
mod error;
mod handle;
mod manager;
pub mod memory;
mod traits;
mod uri;

pub use error::{QueueError, QueueResult};
pub use handle::{QueueCapabilities, QueueHandle};
pub use manager::QueueManager;
pub use traits::{
    CreateQueue, DropQueue, PurgeQueue, Queue, QueueFactory, ReceiptToken, ReceivedMessage,
};
pub use uri::{scheme_of, QueueUri};

#[cfg(test)]
mod tests;
