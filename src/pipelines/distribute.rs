//! Distributor pipeline: fan inbox work out to worker inboxes

use crate::bus::error::{BusResult, ServiceBusError};
use crate::message::TransportMessage;
use crate::pipeline::{Observer, PipelineBuilder, PipelineContext, PipelineEvent};
use crate::pipelines::exception::DistributorExceptionObserver;
use crate::pipelines::keys;
use crate::pipelines::receive::{
    AcknowledgeMessageObserver, DeserializeTransportMessageObserver, DequeueObserver,
    TransactionScopeObserver,
};

pub fn distributor_pipeline() -> PipelineBuilder {
    let mut builder = PipelineBuilder::new("Distribute");
    builder
        .register_stage("Distribute")
        .with_event(PipelineEvent::OnWaitForAvailableWorker)
        .with_event(PipelineEvent::OnStartTransactionScope)
        .with_event(PipelineEvent::OnDequeue)
        .with_event(PipelineEvent::OnDeserializeTransportMessage)
        .with_event(PipelineEvent::OnHandleDistributeMessage)
        .with_event(PipelineEvent::OnCompleteTransactionScope)
        .with_teardown_event(PipelineEvent::OnDisposeTransactionScope)
        .with_teardown_event(PipelineEvent::OnAcknowledgeMessage);
    builder
        .register_observer(WaitForAvailableWorkerObserver)
        .register_observer(TransactionScopeObserver)
        .register_observer(DequeueObserver)
        .register_observer(DeserializeTransportMessageObserver)
        .register_observer(DistributorMessageObserver)
        .register_observer(AcknowledgeMessageObserver)
        .register_exception_observer(DistributorExceptionObserver);
    builder
}

/// Skips the cycle without dequeuing while no worker is known
pub struct WaitForAvailableWorkerObserver;

impl Observer for WaitForAvailableWorkerObserver {
    fn name(&self) -> &str {
        "WaitForAvailableWorkerObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnWaitForAvailableWorker]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        if !bus.worker_availability().has_workers() {
            context.abort();
        }
        Ok(())
    }
}

/// Re-addresses the envelope to the next worker and sends it unchanged otherwise
pub struct DistributorMessageObserver;

impl Observer for DistributorMessageObserver {
    fn name(&self) -> &str {
        "DistributorMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnHandleDistributeMessage]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        let worker = bus
            .worker_availability()
            .next()?
            .ok_or_else(|| ServiceBusError::WorkerConfigurationInvalid {
                message: "no worker inbox is available".to_string(),
            })?;

        let transport_message = keys::required_mut::<TransportMessage>(context, keys::TRANSPORT_MESSAGE)?;
        transport_message.recipient_inbox_work_queue_uri = Some(worker);
        log::trace!(
            "Distributing '{}' ({}) to '{}'",
            transport_message.message_type,
            transport_message.message_id(),
            transport_message.recipient_inbox_work_queue_uri.as_deref().unwrap_or_default()
        );
        bus.dispatch_transport_message(transport_message, true)
    }
}
