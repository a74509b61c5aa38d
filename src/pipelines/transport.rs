//! Send-transport pipeline and the outbox pipeline that feeds it

use crate::bus::error::{BusResult, ServiceBusError};
use crate::message::{encode_transport_message, TransportMessage};
use crate::pipeline::{Observer, PipelineBuilder, PipelineContext, PipelineEvent};
use crate::pipelines::exception::ReceiveExceptionObserver;
use crate::pipelines::keys;
use crate::pipelines::receive::{
    AcknowledgeMessageObserver, DeserializeTransportMessageObserver, DequeueObserver,
    TransactionScopeObserver,
};

pub fn send_transport_pipeline() -> PipelineBuilder {
    let mut builder = PipelineBuilder::new("SendTransport");
    builder
        .register_stage("Send")
        .with_event(PipelineEvent::OnSerializeTransportMessage)
        .with_event(PipelineEvent::OnSendMessage)
        .with_event(PipelineEvent::OnAfterSendMessage);
    builder
        .register_observer(SerializeTransportMessageObserver)
        .register_observer(SendMessageObserver);
    builder
}

/// Outbox: dequeue an envelope and send it straight to its recipient
pub fn outbox_pipeline() -> PipelineBuilder {
    let mut builder = PipelineBuilder::new("OutboxReceive");
    builder
        .register_stage("Read")
        .with_event(PipelineEvent::OnStartTransactionScope)
        .with_event(PipelineEvent::OnDequeue)
        .with_event(PipelineEvent::OnDeserializeTransportMessage);
    builder
        .register_stage("Send")
        .with_event(PipelineEvent::OnDispatchTransportMessage)
        .with_event(PipelineEvent::OnCompleteTransactionScope)
        .with_teardown_event(PipelineEvent::OnDisposeTransactionScope)
        .with_teardown_event(PipelineEvent::OnAcknowledgeMessage);
    builder
        .register_observer(TransactionScopeObserver)
        .register_observer(DequeueObserver)
        .register_observer(DeserializeTransportMessageObserver)
        .register_observer(ForwardTransportMessageObserver)
        .register_observer(AcknowledgeMessageObserver)
        .register_exception_observer(ReceiveExceptionObserver);
    builder
}

pub struct SerializeTransportMessageObserver;

impl Observer for SerializeTransportMessageObserver {
    fn name(&self) -> &str {
        "SerializeTransportMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnSerializeTransportMessage]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        let transport_message = keys::required::<TransportMessage>(context, keys::TRANSPORT_MESSAGE)?;
        let bytes = encode_transport_message(bus.configuration().serializer()?.as_ref(), transport_message)?;
        context.state.set(keys::TRANSPORT_MESSAGE_BYTES, bytes);
        Ok(())
    }
}

/// Enqueues the encoded envelope
///
/// Envelopes that are not yet due go to the local deferred queue. Otherwise
/// the outbox is used when configured, unless the pipeline was asked to
/// dispatch directly to the recipient.
pub struct SendMessageObserver;

impl Observer for SendMessageObserver {
    fn name(&self) -> &str {
        "SendMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnSendMessage]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        let configuration = bus.configuration();
        let transport_message = keys::required::<TransportMessage>(context, keys::TRANSPORT_MESSAGE)?;
        let bytes = keys::required::<Vec<u8>>(context, keys::TRANSPORT_MESSAGE_BYTES)?;
        let direct = context.state.flag(keys::DISPATCH_DIRECT);
        let outbox = configuration.outbox().and_then(|outbox| outbox.work_queue.as_ref());

        let queue = if transport_message.is_ignoring(configuration.clock().now()) {
            configuration
                .deferred_queue()
                .cloned()
                .ok_or_else(|| ServiceBusError::queue_missing("Inbox.DeferredQueue"))?
        } else if let (false, Some(outbox)) = (direct, outbox) {
            outbox.clone()
        } else {
            let uri = transport_message
                .recipient_inbox_work_queue_uri
                .as_deref()
                .filter(|uri| !uri.is_empty())
                .ok_or_else(|| ServiceBusError::RouteNotFound {
                    message_type: transport_message.message_type.clone(),
                })?;
            configuration.queue_manager().get_queue(uri)?
        };

        log::trace!(
            "Sending '{}' ({}) to '{}'",
            transport_message.message_type,
            transport_message.message_id(),
            queue
        );
        queue.enqueue(transport_message.message_id(), bytes)?;
        Ok(())
    }
}

/// Sends a received envelope on to its recipient without passing the outbox again
pub struct ForwardTransportMessageObserver;

impl Observer for ForwardTransportMessageObserver {
    fn name(&self) -> &str {
        "ForwardTransportMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnDispatchTransportMessage]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        let transport_message = keys::required::<TransportMessage>(context, keys::TRANSPORT_MESSAGE)?;
        bus.dispatch_transport_message(transport_message, true)
    }
}
