//! Test modules for the service bus
//!
//! Fixtures build buses over uniquely named memory queues. Pipelines are
//! driven with `ServiceBus::process_once`, so no processor thread runs unless
//! a test starts the bus.

mod send;

use crate::bus::collaborators::{CompressionAlgorithm, EncryptionAlgorithm};
use crate::bus::error::BoxError;
use crate::bus::handlers::HandlerRegistry;
use crate::bus::settings::{InboxSettings, QueueSettings};
use crate::bus::{ServiceBus, ServiceBusConfigurationBuilder};
use crate::message::{
    decode_transport_message, encode_transport_message, message_type_name, BusMessage, JsonSerializer,
    TransportMessage,
};
use crate::queue::api::{MemoryQueue, QueueHandle, QueueManager, QueueUri};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct PlaceOrder {
    pub order_id: u32,
    pub customer: String,
}

impl PlaceOrder {
    pub fn new(order_id: u32) -> Self {
        Self {
            order_id,
            customer: "acme".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct OrderAccepted {
    pub order_id: u32,
}

pub(crate) fn memory_uri(label: &str) -> String {
    format!("memory://bus/{}-{}", label, Uuid::new_v4().simple())
}

/// Queue uris for one endpoint
pub(crate) struct Endpoint {
    pub inbox_work: String,
    pub inbox_error: String,
    pub deferred: String,
    pub outbox_work: String,
    pub outbox_error: String,
    pub control_work: String,
    pub control_error: String,
}

impl Endpoint {
    pub fn new(name: &str) -> Self {
        Self {
            inbox_work: memory_uri(&format!("{}-inbox-work", name)),
            inbox_error: memory_uri(&format!("{}-inbox-error", name)),
            deferred: memory_uri(&format!("{}-inbox-deferred", name)),
            outbox_work: memory_uri(&format!("{}-outbox-work", name)),
            outbox_error: memory_uri(&format!("{}-outbox-error", name)),
            control_work: memory_uri(&format!("{}-control-work", name)),
            control_error: memory_uri(&format!("{}-control-error", name)),
        }
    }

    pub fn inbox(&self) -> InboxSettings {
        InboxSettings {
            queues: queue_settings(&self.inbox_work, &self.inbox_error),
            ..InboxSettings::default()
        }
    }

    pub fn inbox_with_deferred(&self) -> InboxSettings {
        InboxSettings {
            deferred_queue_uri: Some(self.deferred.clone()),
            ..self.inbox()
        }
    }

    pub fn outbox(&self) -> QueueSettings {
        queue_settings(&self.outbox_work, &self.outbox_error)
    }

    pub fn control_inbox(&self) -> QueueSettings {
        queue_settings(&self.control_work, &self.control_error)
    }
}

pub(crate) fn queue_settings(work: &str, error: &str) -> QueueSettings {
    QueueSettings {
        work_queue_uri: Some(work.to_string()),
        error_queue_uri: Some(error.to_string()),
        thread_count: 1,
        duration_to_sleep_when_idle_ms: vec![5, 10, 20],
    }
}

/// JSON serializer, short dequeue timeout and the given handlers
pub(crate) fn builder(handlers: &Arc<HandlerRegistry>) -> ServiceBusConfigurationBuilder {
    ServiceBus::builder()
        .with_serializer(Arc::new(JsonSerializer))
        .with_message_handler_factory(handlers.clone())
        .with_dequeue_timeout(Duration::from_millis(10))
        .with_principal_identity_name("tester")
}

pub(crate) fn bus(builder: ServiceBusConfigurationBuilder) -> ServiceBus {
    ServiceBus::new(builder.build().unwrap()).unwrap()
}

/// Handle onto a memory queue that does not go through any bus's manager
pub(crate) fn queue(uri: &str) -> QueueHandle {
    QueueManager::new().get_queue(uri).unwrap()
}

pub(crate) fn is_empty(uri: &str) -> bool {
    queue(uri).is_empty().unwrap()
}

pub(crate) fn in_flight(uri: &str) -> usize {
    MemoryQueue::new(QueueUri::parse(uri).unwrap())
        .in_flight_count()
        .unwrap()
}

/// Receive and acknowledge every raw payload waiting on `uri`
pub(crate) fn drain_payloads(uri: &str) -> Vec<Vec<u8>> {
    let queue = queue(uri);
    let mut payloads = Vec::new();
    while let Some(received) = queue.dequeue(Duration::ZERO).unwrap() {
        queue.acknowledge(received.token).unwrap();
        payloads.push(received.payload);
    }
    payloads
}

pub(crate) fn drain(uri: &str) -> Vec<TransportMessage> {
    drain_payloads(uri)
        .iter()
        .map(|payload| decode_transport_message(&JsonSerializer, payload).unwrap())
        .collect()
}

pub(crate) fn body<M: BusMessage>(transport_message: &TransportMessage) -> M {
    serde_json::from_slice(&transport_message.message).unwrap()
}

/// Envelope for `message` as another endpoint would have sent it
pub(crate) fn envelope<M: BusMessage>(message: &M, sender: Option<&str>) -> TransportMessage {
    let mut transport_message = TransportMessage::new();
    transport_message.message_type = message_type_name::<M>().to_string();
    transport_message.message = serde_json::to_vec(message).unwrap();
    transport_message.sender_inbox_work_queue_uri = sender.map(str::to_string);
    transport_message
}

pub(crate) fn enqueue_envelope(uri: &str, transport_message: &TransportMessage) {
    let bytes = encode_transport_message(&JsonSerializer, transport_message).unwrap();
    queue(uri)
        .enqueue(transport_message.message_id(), &bytes)
        .unwrap();
}

/// Register a handler for `M` that keeps every message it sees
pub(crate) fn record<M: BusMessage + Clone>(handlers: &HandlerRegistry) -> Arc<Mutex<Vec<M>>> {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    handlers
        .register_fn::<M, _>(move |_context, message| {
            sink.lock().unwrap().push(message);
            Ok(())
        })
        .unwrap();
    received
}

/// Poll `condition` until it holds or `timeout` passes
pub(crate) fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// XORs every byte with a fixed key
pub(crate) struct XorEncryption;

impl EncryptionAlgorithm for XorEncryption {
    fn name(&self) -> &str {
        "xor"
    }

    fn encrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, BoxError> {
        Ok(bytes.iter().map(|b| b ^ 0x5a).collect())
    }

    fn decrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, BoxError> {
        self.encrypt(bytes)
    }
}

/// Reverses the byte order; enough to tell whether the step ran
pub(crate) struct ReverseCompression;

impl CompressionAlgorithm for ReverseCompression {
    fn name(&self) -> &str {
        "reverse"
    }

    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, BoxError> {
        Ok(bytes.iter().rev().copied().collect())
    }

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, BoxError> {
        self.compress(bytes)
    }
}
