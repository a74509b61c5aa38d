//! Send pipeline: business message to dispatched envelope

use crate::bus::error::{BusResult, ServiceBusError};
use crate::bus::message_context::MessageContext;
use crate::message::{TransportMessage, SEND_IMMEDIATELY};
use crate::pipeline::{Observer, PipelineBuilder, PipelineContext, PipelineEvent};
use crate::pipelines::keys;
use crate::queue::api::QueueHandle;
use crate::routing::resolve_route;
use chrono::{DateTime, Utc};

pub fn send_pipeline() -> PipelineBuilder {
    let mut builder = PipelineBuilder::new("Send");
    builder
        .register_stage("Send")
        .with_event(PipelineEvent::OnAssembleMessage)
        .with_event(PipelineEvent::OnFindRouteForMessage)
        .with_event(PipelineEvent::OnEncryptMessage)
        .with_event(PipelineEvent::OnCompressMessage)
        .with_event(PipelineEvent::OnDispatchTransportMessage);
    builder
        .register_observer(AssembleMessageObserver)
        .register_observer(FindMessageRouteObserver)
        .register_observer(EncryptMessageObserver)
        .register_observer(CompressMessageObserver)
        .register_observer(DispatchTransportMessageObserver);
    builder
}

/// Last segment of a full type name, ignoring generic arguments
fn short_type_name(message_type: &str) -> &str {
    let base = message_type.split('<').next().unwrap_or(message_type);
    base.rsplit("::").next().unwrap_or(base)
}

/// Builds the envelope around the serialized business message
pub struct AssembleMessageObserver;

impl Observer for AssembleMessageObserver {
    fn name(&self) -> &str {
        "AssembleMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnAssembleMessage]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        let configuration = bus.configuration();
        let message_type = keys::required::<String>(context, keys::MESSAGE_TYPE)?.clone();
        let body = {
            let value = keys::required::<serde_json::Value>(context, keys::MESSAGE)?;
            configuration
                .serializer()?
                .serialize(value)
                .map_err(|e| ServiceBusError::Serialization {
                    type_name: message_type.clone(),
                    message: e.to_string(),
                })?
        };
        let ignore_till = context
            .state
            .get::<DateTime<Utc>>(keys::IGNORE_TILL)
            .copied()
            .unwrap_or(SEND_IMMEDIATELY);
        let message_context = context
            .state
            .get::<MessageContext>(keys::MESSAGE_CONTEXT)
            .cloned()
            .unwrap_or_default();

        let mut transport_message = TransportMessage::new();
        transport_message.type_hint = short_type_name(&message_type).to_string();
        transport_message.message_type = message_type;
        transport_message.message = body;
        transport_message.sender_inbox_work_queue_uri =
            configuration.inbox_work_queue().map(|queue| queue.uri().to_string());
        transport_message.principal_identity_name = configuration.principal_identity_name().to_string();
        transport_message.send_date = configuration.clock().now();
        transport_message.ignore_till = ignore_till;
        transport_message.encryption_algorithm = configuration.encryption_algorithm().to_string();
        transport_message.compression_algorithm = configuration.compression_algorithm().to_string();
        transport_message.correlation_id = message_context.outgoing_correlation_id.clone();
        transport_message.merge_headers(&message_context.outgoing_headers);
        transport_message.message_received_id = message_context.transport_message().map(|m| m.message_id());

        context.state.set(keys::TRANSPORT_MESSAGE, transport_message);
        Ok(())
    }
}

/// Binds the recipient: the explicit destination, or the single resolved route
pub struct FindMessageRouteObserver;

impl Observer for FindMessageRouteObserver {
    fn name(&self) -> &str {
        "FindMessageRouteObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnFindRouteForMessage]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let recipient = match context.state.get::<QueueHandle>(keys::DESTINATION) {
            Some(destination) => destination.uri().to_string(),
            None => {
                let bus = keys::bus(context)?;
                let message_type = keys::required::<String>(context, keys::MESSAGE_TYPE)?;
                let message = keys::required::<serde_json::Value>(context, keys::MESSAGE)?;
                resolve_route(
                    bus.configuration().message_route_provider().as_ref(),
                    message_type,
                    message,
                )?
            }
        };

        let transport_message = keys::required_mut::<TransportMessage>(context, keys::TRANSPORT_MESSAGE)?;
        transport_message.recipient_inbox_work_queue_uri = Some(recipient);
        Ok(())
    }
}

pub struct EncryptMessageObserver;

impl Observer for EncryptMessageObserver {
    fn name(&self) -> &str {
        "EncryptMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnEncryptMessage]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        let transport_message = keys::required_mut::<TransportMessage>(context, keys::TRANSPORT_MESSAGE)?;
        if !transport_message.is_encrypted() {
            return Ok(());
        }
        let name = transport_message.encryption_algorithm.clone();
        let algorithm = bus.configuration().find_encryption_algorithm(&name)?;
        transport_message.message = algorithm
            .encrypt(&transport_message.message)
            .map_err(|e| ServiceBusError::Algorithm {
                kind: "encryption".to_string(),
                name,
                message: e.to_string(),
            })?;
        Ok(())
    }
}

pub struct CompressMessageObserver;

impl Observer for CompressMessageObserver {
    fn name(&self) -> &str {
        "CompressMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnCompressMessage]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        let transport_message = keys::required_mut::<TransportMessage>(context, keys::TRANSPORT_MESSAGE)?;
        if !transport_message.is_compressed() {
            return Ok(());
        }
        let name = transport_message.compression_algorithm.clone();
        let algorithm = bus.configuration().find_compression_algorithm(&name)?;
        transport_message.message = algorithm
            .compress(&transport_message.message)
            .map_err(|e| ServiceBusError::Algorithm {
                kind: "compression".to_string(),
                name,
                message: e.to_string(),
            })?;
        Ok(())
    }
}

/// Hands the finished envelope to the send-transport pipeline
pub struct DispatchTransportMessageObserver;

impl Observer for DispatchTransportMessageObserver {
    fn name(&self) -> &str {
        "DispatchTransportMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnDispatchTransportMessage]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        let transport_message = keys::required::<TransportMessage>(context, keys::TRANSPORT_MESSAGE)?;
        bus.dispatch_transport_message(transport_message, false)
    }
}
