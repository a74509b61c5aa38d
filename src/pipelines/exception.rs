//! Exception observers for the receiving pipelines

use crate::bus::collaborators::TransactionScope;
use crate::bus::error::ServiceBusError;
use crate::message::TransportMessage;
use crate::pipeline::{ExceptionDisposition, ExceptionObserver, PipelineContext};
use crate::pipelines::keys;
use crate::queue::api::{QueueHandle, ReceivedMessage};
use uuid::Uuid;

fn describe(context: &PipelineContext) -> (String, String) {
    let message = context
        .state
        .get::<TransportMessage>(keys::TRANSPORT_MESSAGE)
        .map(|m| format!("'{}' ({})", m.message_type, m.message_id()))
        .unwrap_or_else(|| "<undecoded message>".to_string());
    let work_queue = context
        .state
        .get::<QueueHandle>(keys::WORK_QUEUE)
        .map(|q| q.to_string())
        .unwrap_or_else(|| "<no work queue>".to_string());
    (message, work_queue)
}

/// Logs a receive failure and leaves the message for redelivery
///
/// The transaction scope is not completed, so the acknowledge step releases
/// the message back to its work queue.
pub struct ReceiveExceptionObserver;

impl ExceptionObserver for ReceiveExceptionObserver {
    fn name(&self) -> &str {
        "ReceiveExceptionObserver"
    }

    fn on_exception(&self, error: &ServiceBusError, context: &mut PipelineContext) -> ExceptionDisposition {
        let (message, work_queue) = describe(context);
        log::error!(
            "Failed to process message {} from '{}' during {}: {}",
            message,
            work_queue,
            context
                .current_event()
                .map(|e| e.to_string())
                .unwrap_or_default(),
            error
        );
        context.state.set(keys::FAILED, true);
        ExceptionDisposition::Handled
    }
}

/// Moves a message the distributor could not forward to the distributor's own error queue
pub struct DistributorExceptionObserver;

impl ExceptionObserver for DistributorExceptionObserver {
    fn name(&self) -> &str {
        "DistributorExceptionObserver"
    }

    fn on_exception(&self, error: &ServiceBusError, context: &mut PipelineContext) -> ExceptionDisposition {
        let (message, work_queue) = describe(context);
        log::error!(
            "Distributor could not route message {} from '{}': {}",
            message,
            work_queue,
            error
        );
        context.state.set(keys::FAILED, true);

        let Some(received) = context.state.get::<ReceivedMessage>(keys::RECEIVED_MESSAGE) else {
            return ExceptionDisposition::Handled;
        };
        let Some(error_queue) = context.state.get::<QueueHandle>(keys::ERROR_QUEUE) else {
            log::error!("Distributor has no error queue; message {} will be redelivered", message);
            return ExceptionDisposition::Handled;
        };
        let message_id = context
            .state
            .get::<TransportMessage>(keys::TRANSPORT_MESSAGE)
            .map(|m| m.message_id())
            .unwrap_or_else(Uuid::new_v4);

        let error_queue_name = error_queue.to_string();
        let moved = error_queue.enqueue(message_id, &received.payload);

        match moved {
            Ok(()) => {
                if let Some(scope) = context
                    .state
                    .get_mut::<Box<dyn TransactionScope>>(keys::TRANSACTION_SCOPE)
                {
                    if let Err(e) = scope.complete() {
                        log::error!("Could not complete distributor transaction scope: {}", e);
                    }
                }
            }
            Err(e) => log::error!("Could not move message {} to '{}': {}", message, error_queue_name, e),
        }
        ExceptionDisposition::Handled
    }
}
