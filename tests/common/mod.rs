//! Common test utilities and helpers
//!
//! Every test gets its own uniquely named memory queues, so buses from
//! different tests never see each other's messages even though the memory
//! backend is shared by the whole process.

#![allow(dead_code)]

use relaybus::bus::api::{
    HandlerRegistry, InboxSettings, JsonSerializer, QueueSettings, ServiceBus, ServiceBusConfigurationBuilder,
};
use relaybus::message::{decode_transport_message, BusMessage, TransportMessage};
use relaybus::queue::api::QueueManager;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAccepted {
    pub order_id: u32,
    pub handled_by: String,
}

pub fn memory_uri(label: &str) -> String {
    format!("memory://integration/{}-{}", label, Uuid::new_v4().simple())
}

pub fn queue_settings(label: &str) -> QueueSettings {
    QueueSettings {
        work_queue_uri: Some(memory_uri(&format!("{}-work", label))),
        error_queue_uri: Some(memory_uri(&format!("{}-error", label))),
        thread_count: 1,
        duration_to_sleep_when_idle_ms: vec![5, 10, 25],
    }
}

pub fn inbox_settings(label: &str) -> InboxSettings {
    InboxSettings {
        queues: queue_settings(label),
        ..InboxSettings::default()
    }
}

pub fn work_uri(queues: &QueueSettings) -> String {
    queues.work_queue_uri.clone().unwrap_or_default()
}

/// JSON serializer and a short dequeue timeout so stop() returns quickly
pub fn builder(handlers: &Arc<HandlerRegistry>) -> ServiceBusConfigurationBuilder {
    ServiceBus::builder()
        .with_serializer(Arc::new(JsonSerializer))
        .with_message_handler_factory(handlers.clone())
        .with_dequeue_timeout(Duration::from_millis(20))
}

pub fn build(builder: ServiceBusConfigurationBuilder) -> ServiceBus {
    ServiceBus::new(builder.build().expect("configuration")).expect("bus")
}

/// Register a handler for `M` that keeps every message it sees
pub fn record<M: BusMessage + Clone>(handlers: &HandlerRegistry) -> Arc<Mutex<Vec<M>>> {
    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    handlers
        .register_fn::<M, _>(move |_context, message| {
            sink.lock().unwrap().push(message);
            Ok(())
        })
        .expect("register handler");
    received
}

pub fn count<M>(received: &Arc<Mutex<Vec<M>>>) -> usize {
    received.lock().unwrap().len()
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Receive and acknowledge every envelope waiting on `uri`
pub fn drain(uri: &str) -> Vec<TransportMessage> {
    let queue = QueueManager::new().get_queue(uri).expect("queue");
    let mut messages = Vec::new();
    while let Some(received) = queue.dequeue(Duration::ZERO).expect("dequeue") {
        queue.acknowledge(received.token).expect("acknowledge");
        messages.push(decode_transport_message(&JsonSerializer, &received.payload).expect("envelope"));
    }
    messages
}

pub fn is_empty(uri: &str) -> bool {
    QueueManager::new()
        .get_queue(uri)
        .and_then(|queue| queue.is_empty())
        .expect("queue")
}
