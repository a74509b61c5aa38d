//! Receive pipelines for the inbox and the control inbox
//!
//! Read: start transaction scope, dequeue, deserialize envelope, decompress,
//! decrypt, deserialize body. Handle: received, dispatch to handler, handled,
//! complete scope, then always dispose the scope and acknowledge or release.

use crate::bus::collaborators::TransactionScope;
use crate::bus::context::BusContext;
use crate::bus::error::{BusResult, ServiceBusError};
use crate::bus::handlers::HandlerContext;
use crate::bus::message_context::MessageContext;
use crate::message::{decode_transport_message, message_type_name, TransportMessage};
use crate::pipeline::{Observer, PipelineBuilder, PipelineContext, PipelineEvent};
use crate::pipelines::exception::ReceiveExceptionObserver;
use crate::pipelines::keys;
use crate::pipelines::PipelineKind;
use crate::queue::api::{QueueHandle, ReceivedMessage};
use crate::worker::{panic_message, WorkerStarted, WorkerStopped};
use std::panic::{catch_unwind, AssertUnwindSafe};
use uuid::Uuid;

pub fn receive_pipeline(kind: PipelineKind) -> PipelineBuilder {
    let mut builder = PipelineBuilder::new(kind.to_string());
    builder
        .register_stage("Read")
        .with_event(PipelineEvent::OnStartTransactionScope)
        .with_event(PipelineEvent::OnDequeue)
        .with_event(PipelineEvent::OnDeserializeTransportMessage)
        .with_event(PipelineEvent::OnDecompressMessage)
        .with_event(PipelineEvent::OnDecryptMessage)
        .with_event(PipelineEvent::OnDeserializeMessage);
    builder
        .register_stage("Handle")
        .with_event(PipelineEvent::OnMessageReceived)
        .with_event(PipelineEvent::OnHandleMessage)
        .with_event(PipelineEvent::OnMessageHandled)
        .with_event(PipelineEvent::OnCompleteTransactionScope)
        .with_teardown_event(PipelineEvent::OnDisposeTransactionScope)
        .with_teardown_event(PipelineEvent::OnAcknowledgeMessage);
    builder
        .register_observer(TransactionScopeObserver)
        .register_observer(DequeueObserver)
        .register_observer(DeserializeTransportMessageObserver)
        .register_observer(DecompressMessageObserver)
        .register_observer(DecryptMessageObserver)
        .register_observer(DeserializeMessageObserver)
        .register_observer(ReceiveMessageStateObserver)
        .register_observer(HandleMessageObserver)
        .register_observer(AcknowledgeMessageObserver)
        .register_exception_observer(ReceiveExceptionObserver);
    builder
}

/// Opens, completes and disposes the transaction scope around a receive
pub struct TransactionScopeObserver;

impl Observer for TransactionScopeObserver {
    fn name(&self) -> &str {
        "TransactionScopeObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[
            PipelineEvent::OnStartTransactionScope,
            PipelineEvent::OnCompleteTransactionScope,
            PipelineEvent::OnDisposeTransactionScope,
        ]
    }

    fn on_event(&self, event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        match event {
            PipelineEvent::OnStartTransactionScope => {
                let bus = keys::bus(context)?;
                let scope = bus.configuration().transaction_scope_factory().create()?;
                context.state.set(keys::TRANSACTION_SCOPE, scope);
            }
            PipelineEvent::OnCompleteTransactionScope => {
                if let Some(scope) = context
                    .state
                    .get_mut::<Box<dyn TransactionScope>>(keys::TRANSACTION_SCOPE)
                {
                    scope.complete()?;
                }
            }
            PipelineEvent::OnDisposeTransactionScope => {
                if let Some(scope) = context
                    .state
                    .get_mut::<Box<dyn TransactionScope>>(keys::TRANSACTION_SCOPE)
                {
                    scope.dispose()?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Receives one raw payload; no message within the timeout aborts the cycle
pub struct DequeueObserver;

impl Observer for DequeueObserver {
    fn name(&self) -> &str {
        "DequeueObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnDequeue]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        let work_queue = keys::required::<QueueHandle>(context, keys::WORK_QUEUE)?.clone();
        match work_queue.dequeue(bus.configuration().dequeue_timeout())? {
            Some(received) => {
                context.state.set(keys::WORKING, true);
                context.state.set(keys::RECEIVED_MESSAGE, received);
            }
            None => context.abort(),
        }
        Ok(())
    }
}

/// Decodes the envelope
///
/// A payload that is not a valid envelope can never succeed, so it is moved to
/// the error queue and acknowledged instead of being released for redelivery.
pub struct DeserializeTransportMessageObserver;

impl Observer for DeserializeTransportMessageObserver {
    fn name(&self) -> &str {
        "DeserializeTransportMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnDeserializeTransportMessage]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        let received = keys::required::<ReceivedMessage>(context, keys::RECEIVED_MESSAGE)?;
        let serializer = bus.configuration().serializer()?;

        match decode_transport_message(serializer.as_ref(), &received.payload) {
            Ok(transport_message) => {
                context.state.set(keys::TRANSPORT_MESSAGE, transport_message);
                Ok(())
            }
            Err(error @ ServiceBusError::EnvelopeDeserialization { .. }) => {
                let work_queue = keys::required::<QueueHandle>(context, keys::WORK_QUEUE)?.clone();
                let error_queue = keys::required::<QueueHandle>(context, keys::ERROR_QUEUE)?.clone();
                log::error!(
                    "Moving undecodable message from '{}' to '{}': {}",
                    work_queue,
                    error_queue,
                    error
                );
                error_queue.enqueue(Uuid::new_v4(), &received.payload)?;
                if let Some(received) = context.state.take::<ReceivedMessage>(keys::RECEIVED_MESSAGE) {
                    work_queue.acknowledge(received.token)?;
                }
                context.abort();
                Ok(())
            }
            Err(error) => Err(error),
        }
    }
}

pub struct DecompressMessageObserver;

impl Observer for DecompressMessageObserver {
    fn name(&self) -> &str {
        "DecompressMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnDecompressMessage]
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
            .decompress(&transport_message.message)
            .map_err(|e| ServiceBusError::Algorithm {
                kind: "compression".to_string(),
                name,
                message: e.to_string(),
            })?;
        Ok(())
    }
}

pub struct DecryptMessageObserver;

impl Observer for DecryptMessageObserver {
    fn name(&self) -> &str {
        "DecryptMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnDecryptMessage]
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
            .decrypt(&transport_message.message)
            .map_err(|e| ServiceBusError::Algorithm {
                kind: "encryption".to_string(),
                name,
                message: e.to_string(),
            })?;
        Ok(())
    }
}

pub struct DeserializeMessageObserver;

impl Observer for DeserializeMessageObserver {
    fn name(&self) -> &str {
        "DeserializeMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnDeserializeMessage]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        let transport_message = keys::required::<TransportMessage>(context, keys::TRANSPORT_MESSAGE)?;
        let message = bus
            .configuration()
            .serializer()?
            .to_value(&transport_message.message_type, &transport_message.message)?;
        context.state.set(keys::MESSAGE, message);
        Ok(())
    }
}

pub struct ReceiveMessageStateObserver;

impl Observer for ReceiveMessageStateObserver {
    fn name(&self) -> &str {
        "ReceiveMessageStateObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnMessageReceived, PipelineEvent::OnMessageHandled]
    }

    fn on_event(&self, event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        if let Some(transport_message) = context.state.get::<TransportMessage>(keys::TRANSPORT_MESSAGE) {
            log::trace!(
                "{} '{}' ({})",
                event,
                transport_message.message_type,
                transport_message.message_id()
            );
        }
        Ok(())
    }
}

/// Dispatches the business message to its handler
///
/// Worker registration messages are handled by the bus itself. A message the
/// idempotence tracker has already seen is skipped but still acknowledged.
pub struct HandleMessageObserver;

impl Observer for HandleMessageObserver {
    fn name(&self) -> &str {
        "HandleMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnHandleMessage]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let bus = keys::bus(context)?;
        let configuration = bus.configuration();
        let transport_message = keys::required::<TransportMessage>(context, keys::TRANSPORT_MESSAGE)?.clone();
        let message_id = transport_message.message_id();

        if let Some(tracker) = configuration.idempotence_tracker() {
            if tracker.has_processed(message_id)? {
                log::debug!(
                    "Message '{}' ({}) has already been processed; skipping",
                    transport_message.message_type,
                    message_id
                );
                return Ok(());
            }
        }

        let message = context
            .state
            .take::<serde_json::Value>(keys::MESSAGE)
            .ok_or_else(|| ServiceBusError::Pipeline {
                pipeline: "receive".to_string(),
                message: "business message has not been deserialized".to_string(),
            })?;

        if !handle_control_message(&bus, &transport_message, &message)? {
            let handler = configuration
                .message_handler_factory()?
                .get_handler(&transport_message.message_type)
                .ok_or_else(|| ServiceBusError::HandlerNotFound {
                    message_type: transport_message.message_type.clone(),
                })?;
            let mut handler_context = HandlerContext::new(&bus, MessageContext::handling(&transport_message));
            // A panic is a failed attempt so the receipt is still released
            catch_unwind(AssertUnwindSafe(|| handler.handle(&mut handler_context, message))).map_err(
                |panic| ServiceBusError::Handler {
                    message_type: transport_message.message_type.clone(),
                    source: format!("handler panicked: {}", panic_message(panic.as_ref())).into(),
                },
            )??;
        }

        if let Some(tracker) = configuration.idempotence_tracker() {
            tracker.record_processed(message_id)?;
        }
        Ok(())
    }
}

/// Worker registration messages; `false` when the message is not one of them
fn handle_control_message(
    bus: &BusContext,
    transport_message: &TransportMessage,
    message: &serde_json::Value,
) -> BusResult<bool> {
    let message_type = transport_message.message_type.as_str();
    if message_type == message_type_name::<WorkerStarted>() {
        let started: WorkerStarted = from_value(message_type, message)?;
        bus.worker_availability().register(&started.inbox_work_queue_uri)?;
        Ok(true)
    } else if message_type == message_type_name::<WorkerStopped>() {
        let stopped: WorkerStopped = from_value(message_type, message)?;
        bus.worker_availability().unregister(&stopped.inbox_work_queue_uri)?;
        Ok(true)
    } else {
        Ok(false)
    }
}

fn from_value<T: serde::de::DeserializeOwned>(message_type: &str, message: &serde_json::Value) -> BusResult<T> {
    T::deserialize(message).map_err(|e| ServiceBusError::Serialization {
        type_name: message_type.to_string(),
        message: e.to_string(),
    })
}

/// Acknowledges when the scope completed, otherwise releases for redelivery
pub struct AcknowledgeMessageObserver;

impl Observer for AcknowledgeMessageObserver {
    fn name(&self) -> &str {
        "AcknowledgeMessageObserver"
    }

    fn events(&self) -> &[PipelineEvent] {
        &[PipelineEvent::OnAcknowledgeMessage]
    }

    fn on_event(&self, _event: PipelineEvent, context: &mut PipelineContext) -> BusResult<()> {
        let Some(received) = context.state.take::<ReceivedMessage>(keys::RECEIVED_MESSAGE) else {
            return Ok(());
        };
        let work_queue = keys::required::<QueueHandle>(context, keys::WORK_QUEUE)?;
        let completed = context
            .state
            .get::<Box<dyn TransactionScope>>(keys::TRANSACTION_SCOPE)
            .is_some_and(|scope| scope.is_completed());

        if completed {
            work_queue.acknowledge(received.token)?;
        } else {
            log::debug!("Releasing message on '{}' for redelivery", work_queue);
            work_queue.release(received.token)?;
        }
        Ok(())
    }
}
