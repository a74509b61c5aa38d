//! The bus pipelines
//!
//! Each [`PipelineKind`] is assembled once into a shared definition; modules
//! get a chance to add observers while it is being built.

mod deferred;
mod distribute;
mod exception;
pub mod keys;
mod receive;
mod send;
mod startup;
mod transport;

pub use deferred::{DeferredOutcome, ProcessDeferredMessageObserver};
pub use distribute::{DistributorMessageObserver, WaitForAvailableWorkerObserver};
pub use exception::{DistributorExceptionObserver, ReceiveExceptionObserver};
pub use receive::{
    AcknowledgeMessageObserver, DecompressMessageObserver, DecryptMessageObserver,
    DeserializeMessageObserver, DeserializeTransportMessageObserver, DequeueObserver,
    HandleMessageObserver, ReceiveMessageStateObserver, TransactionScopeObserver,
};
pub use send::{
    AssembleMessageObserver, CompressMessageObserver, DispatchTransportMessageObserver,
    EncryptMessageObserver, FindMessageRouteObserver,
};
pub use startup::StartupProcessingObserver;
pub use transport::{ForwardTransportMessageObserver, SendMessageObserver, SerializeTransportMessageObserver};

use crate::bus::collaborators::Module;
use crate::bus::context::BusContext;
use crate::bus::error::BusResult;
use crate::pipeline::{ExecutionStatus, PipelineDefinition};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum PipelineKind {
    Startup,
    Send,
    SendTransport,
    InboxReceive,
    ControlInboxReceive,
    OutboxReceive,
    DeferredReceive,
    Distribute,
}

/// Build the definition for `kind`, letting every module extend it
pub fn define(kind: PipelineKind, modules: &[Arc<dyn Module>]) -> PipelineDefinition {
    let mut builder = match kind {
        PipelineKind::Startup => startup::startup_pipeline(),
        PipelineKind::Send => send::send_pipeline(),
        PipelineKind::SendTransport => transport::send_transport_pipeline(),
        PipelineKind::InboxReceive | PipelineKind::ControlInboxReceive => receive::receive_pipeline(kind),
        PipelineKind::OutboxReceive => transport::outbox_pipeline(),
        PipelineKind::DeferredReceive => deferred::deferred_pipeline(),
        PipelineKind::Distribute => distribute::distributor_pipeline(),
    };
    for module in modules {
        module.configure_pipeline(kind, &mut builder);
    }
    builder.build()
}

/// What one receiving pipeline execution amounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub status: ExecutionStatus,
    /// A message was dequeued
    pub working: bool,
    /// A failure was handled by an exception observer
    pub failed: bool,
    pub deferred: Option<DeferredOutcome>,
}

/// Rent a pipeline of `kind`, execute it once and return it to the pool
pub fn execute_pipeline(bus: &Arc<BusContext>, kind: PipelineKind) -> BusResult<PipelineOutcome> {
    let mut pipeline = bus.pipelines().acquire(kind)?;
    let status = pipeline.execute()?;
    let state = pipeline.state();
    Ok(PipelineOutcome {
        status,
        working: state.flag(keys::WORKING),
        failed: state.flag(keys::FAILED),
        deferred: state.get::<DeferredOutcome>(keys::DEFERRED_OUTCOME).copied(),
    })
}

#[cfg(test)]
mod tests;
