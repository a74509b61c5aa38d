//! State keys shared by the bus pipelines

use crate::bus::context::BusContext;
use crate::bus::error::{BusResult, ServiceBusError};
use crate::pipeline::PipelineContext;
use std::any::Any;
use std::sync::Arc;

/// `Arc<BusContext>` set when a pipeline is obtained from the pool
pub const BUS: &str = "bus";
/// `QueueHandle` the pipeline receives from
pub const WORK_QUEUE: &str = "work_queue";
/// `QueueHandle` for messages that cannot be processed
pub const ERROR_QUEUE: &str = "error_queue";
/// Business message as a `serde_json::Value`
pub const MESSAGE: &str = "message";
/// Full type name of the business message
pub const MESSAGE_TYPE: &str = "message_type";
/// `DateTime<Utc>` before which the message must not be delivered
pub const IGNORE_TILL: &str = "ignore_till";
/// Explicit destination `QueueHandle`, bypassing route resolution
pub const DESTINATION: &str = "destination";
pub const MESSAGE_CONTEXT: &str = "message_context";
pub const TRANSPORT_MESSAGE: &str = "transport_message";
/// Encoded envelope (`Vec<u8>`)
pub const TRANSPORT_MESSAGE_BYTES: &str = "transport_message_bytes";
/// `ReceivedMessage` holding the raw payload and its receipt
pub const RECEIVED_MESSAGE: &str = "received_message";
/// `Box<dyn TransactionScope>`
pub const TRANSACTION_SCOPE: &str = "transaction_scope";
/// Set when a message was dequeued
pub const WORKING: &str = "working";
/// Set when an exception observer dealt with a failure
pub const FAILED: &str = "failed";
/// Enqueue to the recipient even when an outbox is configured
pub const DISPATCH_DIRECT: &str = "dispatch_direct";
pub const DEFERRED_OUTCOME: &str = "deferred_outcome";
/// `Vec<ProcessorThreadPool>` assembled by the startup pipeline
pub const PROCESSOR_POOLS: &str = "processor_pools";

fn missing(context: &PipelineContext, key: &str) -> ServiceBusError {
    ServiceBusError::Pipeline {
        pipeline: context
            .current_event()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "pipeline".to_string()),
        message: format!("required state '{}' is missing", key),
    }
}

pub fn bus(context: &PipelineContext) -> BusResult<Arc<BusContext>> {
    required::<Arc<BusContext>>(context, BUS).cloned()
}

pub fn required<'a, T: Any + Send>(context: &'a PipelineContext, key: &str) -> BusResult<&'a T> {
    context
        .state
        .get::<T>(key)
        .ok_or_else(|| missing(context, key))
}

pub fn required_mut<'a, T: Any + Send>(context: &'a mut PipelineContext, key: &str) -> BusResult<&'a mut T> {
    if !context.state.contains(key) {
        return Err(missing(context, key));
    }
    match context.state.get_mut::<T>(key) {
        Some(value) => Ok(value),
        None => Err(ServiceBusError::Pipeline {
            pipeline: "state".to_string(),
            message: format!("state '{}' holds an unexpected type", key),
        }),
    }
}
