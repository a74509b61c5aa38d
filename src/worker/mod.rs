//! Processor threads
//!
//! Every configured queue role gets a [`ProcessorThreadPool`] whose threads run
//! one pipeline execution at a time until the pool is disposed.

mod activity;
mod availability;
mod processor;
mod thread_pool;

pub use activity::{ActivitySignal, ThreadActivity};
pub use availability::{WorkerAvailability, WorkerStarted, WorkerStopped};
pub use processor::{DeferredMessageProcessor, PipelineProcessor, Processor};
pub(crate) use thread_pool::panic_message;
pub use thread_pool::ProcessorThreadPool;
