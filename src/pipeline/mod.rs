//! Pipeline engine
//!
//! A pipeline is a static script of named stages, each an ordered list of
//! [`PipelineEvent`]s. Observers subscribe to event kinds; executing a pipeline
//! walks the script and calls every subscribed observer, in registration
//! order, against a per-execution [`State`] bag.
//!
//! ```text
//! Stage "Read"              Stage "Handle"
//! ┌─────────┬─────────┐     ┌─────────┬──────────────────┐
//! │ Dequeue │ Deser.. │ ──► │ Handle  │ Acknowledge (td) │
//! └────┬────┴────┬────┘     └────┬────┴────────┬─────────┘
//!      ▼         ▼               ▼             ▼
//!   observers registered for each event kind, in order
//! ```
//!
//! When an observer fails, the pipeline is aborted and the error is offered to
//! the exception observers. Events marked as teardown (td) still run after an
//! abort so transactions and receipts are always released.

mod definition;
mod event;
mod observer;
mod pipeline;
mod pool;
mod state;

pub use definition::{PipelineBuilder, PipelineDefinition, Stage, StageBuilder, StageEvent};
pub use event::PipelineEvent;
pub use observer::{ExceptionDisposition, ExceptionObserver, Observer};
pub use pipeline::{ExecutionStatus, Pipeline, PipelineContext};
pub use pool::{PipelinePool, PooledPipeline};
pub use state::State;

#[cfg(test)]
mod tests;
