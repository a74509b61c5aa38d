//! Deferred queue sweep: requeue what is not due, forward what is

use crate::bus::error::BusResult;
use crate::message::TransportMessage;
use crate::pipeline::{Observer, PipelineBuilder, PipelineContext, PipelineEvent};
use crate::pipelines::exception::ReceiveExceptionObserver;
use crate::pipelines::keys;
use crate::pipelines::receive::{
    AcknowledgeMessageObserver, DeserializeTransportMessageObserver, DequeueObserver,
    TransactionScopeObserver,
};
use crate::queue::api::{QueueHandle, ReceivedMessage};
use uuid::Uuid;

/// What a deferred pipeline execution did with the message it received
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredOutcome {
    /// Not yet due; put back at the tail of the deferred queue
    Requeued(Uuid),
    /// Due; sent on to its recipient
    Forwarded(Uuid),
}

pub fn deferred_pipeline() -> PipelineBuilder {
    let mut builder = PipelineBuilder::new("DeferredReceive");
    builder
        .register_stage("Read")
        .with_event(PipelineEvent::OnStartTransactionScope)
        .with_event(PipelineEvent::OnDequeue)
        .with_event(PipelineEvent::OnDeserializeTransportMessage);
    builder
        .register_stage("Process")
        .with_event(PipelineEvent::OnProcessDeferredMessage)
        .with_event(PipelineEvent::OnCompleteTransactionScope)
        .with_teardown_event(PipelineEvent::OnDisposeTransactionScope)
        .with_teardown_event(PipelineEvent::OnAcknowledgeMessage);
    builder
        .register_observer(TransactionScopeObserver)
        .register_observer(DequeueObserver)
        .register_observer(DeserializeTransportMessageObserver)
        .register_observer(ProcessDeferredMessageObserver)
        .register_observer(AcknowledgeMessageObserver)
        .register_exception_observer(ReceiveExceptionObserver);
    builder
}

pub struct ProcessDeferredMessageObserver;

impl Observer for ProcessDeferredMessageObserver {
    fn name(&self) -> &str {
        "ProcessDeferredMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnProcessDeferredMessage]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        let transport_message = keys::required::<TransportMessage>(context, keys::TRANSPORT_MESSAGE)?;
        let message_id = transport_message.message_id();

        let outcome = if transport_message.is_ignoring(bus.configuration().clock().now()) {
            let received = keys::required::<ReceivedMessage>(context, keys::RECEIVED_MESSAGE)?;
            let work_queue = keys::required::<QueueHandle>(context, keys::WORK_QUEUE)?;
            work_queue.enqueue(message_id, &received.payload)?;
            DeferredOutcome::Requeued(message_id)
        } else {
            log::trace!(
                "Deferred message '{}' ({}) is due",
                transport_message.message_type,
                message_id
            );
            bus.dispatch_transport_message(transport_message, false)?;
            DeferredOutcome::Forwarded(message_id)
        };

        context.state.set(keys::DEFERRED_OUTCOME, outcome);
        Ok(())
    }
}
