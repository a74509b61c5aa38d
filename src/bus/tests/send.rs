//! Tests for the send operations

use super::{
    body, builder, bus, drain, is_empty, memory_uri, Endpoint, OrderAccepted, PlaceOrder,
    ReverseCompression, XorEncryption,
};
use crate::bus::collaborators::{MemorySubscriptionManager, MessageRouteProvider};
use crate::bus::error::ServiceBusError;
use crate::bus::handlers::HandlerRegistry;
use crate::bus::message_context::MessageContext;
use crate::core::time::ManualClock;
use crate::message::{message_type_name, TransportMessage, SEND_IMMEDIATELY};
use crate::pipelines::PipelineKind;
use crate::routing::{DefaultMessageRouteProvider, MessageRoute, RouteSpecification};
use chrono::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct FixedRoutes {
    uris: Vec<String>,
    calls: AtomicUsize,
}

impl FixedRoutes {
    fn new(uris: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            uris,
            calls: AtomicUsize::new(0),
        })
    }
}

impl MessageRouteProvider for FixedRoutes {
    fn get_route_uris(&self, _message_type: &str, _message: &serde_json::Value) -> Vec<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.uris.clone()
    }
}

#[test]
fn test_send_resolves_single_route_and_stamps_envelope() {
    let endpoint = Endpoint::new("send-route");
    let billing = memory_uri("send-route-billing");
    let handlers = Arc::new(HandlerRegistry::new());
    let routes = DefaultMessageRouteProvider::new().with_route(
        MessageRoute::new(billing.clone())
            .with_specification(RouteSpecification::StartsWith(message_type_name::<PlaceOrder>().to_string())),
    );
    let bus = bus(builder(&handlers)
        .with_inbox(endpoint.inbox())
        .with_message_route_provider(Arc::new(routes)));

    let sent = bus.send(&PlaceOrder::new(1)).unwrap();

    let delivered = drain(&billing);
    assert_eq!(delivered.len(), 1);
    let envelope = &delivered[0];
    assert_eq!(envelope.message_id(), sent.message_id());
    assert_eq!(envelope.message_type, message_type_name::<PlaceOrder>());
    assert_eq!(envelope.type_hint, "PlaceOrder");
    assert_eq!(envelope.recipient_inbox_work_queue_uri.as_deref(), Some(billing.as_str()));
    assert_eq!(
        envelope.sender_inbox_work_queue_uri.as_deref(),
        Some(endpoint.inbox_work.as_str())
    );
    assert_eq!(envelope.principal_identity_name, "tester");
    assert_eq!(envelope.ignore_till, SEND_IMMEDIATELY);
    assert_eq!(envelope.message_received_id, None);
    assert_eq!(body::<PlaceOrder>(envelope), PlaceOrder::new(1));
}

#[test]
fn test_send_to_bypasses_route_provider() {
    let target = memory_uri("send-to-target");
    let handlers = Arc::new(HandlerRegistry::new());
    let routes = FixedRoutes::new(Vec::new());
    let bus = bus(builder(&handlers).with_message_route_provider(routes.clone()));

    bus.send_to(&target, &PlaceOrder::new(2)).unwrap();

    assert_eq!(routes.calls.load(Ordering::SeqCst), 0);
    assert_eq!(drain(&target).len(), 1);
}

#[test]
fn test_send_without_route_fails() {
    let handlers = Arc::new(HandlerRegistry::new());
    let routes = FixedRoutes::new(Vec::new());
    let bus = bus(builder(&handlers).with_message_route_provider(routes.clone()));

    let error = bus.send(&PlaceOrder::new(3)).unwrap_err();

    assert!(matches!(error, ServiceBusError::RouteNotFound { .. }));
    assert_eq!(routes.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_ambiguous_route_sends_nothing() {
    let first = memory_uri("send-ambiguous-a");
    let second = memory_uri("send-ambiguous-b");
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers)
        .with_message_route_provider(FixedRoutes::new(vec![first.clone(), second.clone()])));

    match bus.send(&PlaceOrder::new(4)) {
        Err(ServiceBusError::AmbiguousRoute { uris, .. }) => {
            assert_eq!(uris, format!("{},{}", first, second));
        }
        other => panic!("expected an ambiguous route, got {:?}", other),
    }
    assert!(is_empty(&first));
    assert!(is_empty(&second));
}

#[test]
fn test_local_sends_need_an_inbox() {
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers));

    match bus.send_local(&PlaceOrder::new(5)) {
        Err(ServiceBusError::QueueConfigurationMissing { queue }) => assert_eq!(queue, "Inbox.WorkQueue"),
        other => panic!("expected a missing inbox, got {:?}", other),
    }
    assert!(matches!(
        bus.send_deferred_local(chrono::Utc::now() + Duration::minutes(1), &PlaceOrder::new(5)),
        Err(ServiceBusError::DeferredLocalWithoutInbox)
    ));
}

#[test]
fn test_send_local_targets_own_inbox() {
    let endpoint = Endpoint::new("send-local");
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers).with_inbox(endpoint.inbox()));

    bus.send_local(&PlaceOrder::new(6)).unwrap();

    let delivered = drain(&endpoint.inbox_work);
    assert_eq!(delivered.len(), 1);
    assert_eq!(
        delivered[0].recipient_inbox_work_queue_uri.as_deref(),
        Some(endpoint.inbox_work.as_str())
    );
}

#[test]
fn test_reply_needs_a_message_being_handled() {
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers));

    assert!(matches!(
        bus.send_reply(&OrderAccepted { order_id: 1 }),
        Err(ServiceBusError::ReplyWithoutCurrentMessage)
    ));

    let anonymous = TransportMessage::new();
    assert!(matches!(
        bus.context()
            .send_reply(&MessageContext::handling(&anonymous), &OrderAccepted { order_id: 1 }),
        Err(ServiceBusError::ReplyMissingSenderUri { .. })
    ));
}

#[test]
fn test_reply_goes_to_sender_and_inherits_correlation() {
    let client = memory_uri("send-reply-client");
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers));

    let mut received = TransportMessage::new();
    received.sender_inbox_work_queue_uri = Some(client.clone());
    received.correlation_id = "order-7".to_string();
    received.add_header("tenant", "acme");

    bus.context()
        .send_reply(&MessageContext::handling(&received), &OrderAccepted { order_id: 7 })
        .unwrap();

    let replies = drain(&client);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].correlation_id, "order-7");
    assert_eq!(replies[0].header("tenant"), Some("acme"));
    assert_eq!(replies[0].message_received_id, Some(received.message_id()));
    assert_eq!(body::<OrderAccepted>(&replies[0]), OrderAccepted { order_id: 7 });
}

#[test]
fn test_message_context_stamps_correlation_and_headers() {
    let target = memory_uri("send-context");
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers));
    let context = MessageContext::new()
        .with_correlation_id("batch-12")
        .with_header("source", "import");

    bus.context().send_to(&context, &target, &PlaceOrder::new(8)).unwrap();

    let delivered = drain(&target);
    assert_eq!(delivered[0].correlation_id, "batch-12");
    assert_eq!(delivered[0].header("source"), Some("import"));
}

#[test]
fn test_future_send_waits_on_deferred_queue() {
    let endpoint = Endpoint::new("send-deferred");
    let target = memory_uri("send-deferred-target");
    let clock = ManualClock::starting_now();
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers)
        .with_inbox(endpoint.inbox_with_deferred())
        .with_clock(Arc::new(clock.clone())));
    let at = bus.configuration().clock().now() + Duration::minutes(10);

    let sent = bus.send_deferred(at, &PlaceOrder::new(9), Some(&target)).unwrap();

    assert!(is_empty(&target));
    let deferred = drain(&endpoint.deferred);
    assert_eq!(deferred.len(), 1);
    assert_eq!(deferred[0].message_id(), sent.message_id());
    assert_eq!(deferred[0].ignore_till, at);
    assert_eq!(deferred[0].recipient_inbox_work_queue_uri.as_deref(), Some(target.as_str()));
}

#[test]
fn test_past_deferred_send_is_immediate() {
    let endpoint = Endpoint::new("send-past");
    let target = memory_uri("send-past-target");
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers).with_inbox(endpoint.inbox_with_deferred()));

    bus.send_deferred(chrono::Utc::now() - Duration::seconds(1), &PlaceOrder::new(10), Some(&target))
        .unwrap();

    assert_eq!(drain(&target).len(), 1);
    assert!(is_empty(&endpoint.deferred));
}

#[test]
fn test_future_send_without_deferred_queue_fails() {
    let endpoint = Endpoint::new("send-no-deferred");
    let target = memory_uri("send-no-deferred-target");
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers).with_inbox(endpoint.inbox()));

    match bus.send_deferred(chrono::Utc::now() + Duration::hours(1), &PlaceOrder::new(11), Some(&target)) {
        Err(ServiceBusError::QueueConfigurationMissing { queue }) => assert_eq!(queue, "Inbox.DeferredQueue"),
        other => panic!("expected a missing deferred queue, got {:?}", other),
    }
    assert!(is_empty(&target));
}

#[test]
fn test_outbox_holds_sends_until_forwarded() {
    let endpoint = Endpoint::new("send-outbox");
    let target = memory_uri("send-outbox-target");
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers)
        .with_inbox(endpoint.inbox())
        .with_outbox(endpoint.outbox()));

    let sent = bus.send_to(&target, &PlaceOrder::new(12)).unwrap();

    assert!(is_empty(&target));
    assert!(!is_empty(&endpoint.outbox_work));

    let outcome = bus.process_once(PipelineKind::OutboxReceive).unwrap();

    assert!(outcome.working);
    assert!(!outcome.failed);
    assert!(is_empty(&endpoint.outbox_work));
    let delivered = drain(&target);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].message_id(), sent.message_id());
}

#[test]
fn test_publish_sends_a_copy_to_each_subscriber() {
    let first = memory_uri("publish-a");
    let second = memory_uri("publish-b");
    let subscriptions = Arc::new(MemorySubscriptionManager::new());
    subscriptions
        .subscribe(message_type_name::<OrderAccepted>(), &first)
        .unwrap();
    subscriptions
        .subscribe(message_type_name::<OrderAccepted>(), &second)
        .unwrap();
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers).with_subscription_manager(subscriptions));

    let sent_to = bus.publish(&OrderAccepted { order_id: 13 }).unwrap();

    assert_eq!(sent_to, vec![first.clone(), second.clone()]);
    assert_eq!(drain(&first).len(), 1);
    assert_eq!(drain(&second).len(), 1);
}

#[test]
fn test_publish_without_subscription_manager_sends_nothing() {
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers));

    assert!(bus.publish(&OrderAccepted { order_id: 14 }).unwrap().is_empty());
}

#[test]
fn test_body_is_encrypted_then_compressed() {
    let target = memory_uri("send-algorithms");
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers)
        .register_encryption_algorithm(Arc::new(XorEncryption))
        .register_compression_algorithm(Arc::new(ReverseCompression))
        .encrypt_with("xor")
        .compress_with("reverse"));

    bus.send_to(&target, &PlaceOrder::new(15)).unwrap();

    let delivered = drain(&target);
    let envelope = &delivered[0];
    assert_eq!(envelope.encryption_algorithm, "xor");
    assert_eq!(envelope.compression_algorithm, "reverse");

    let plain = serde_json::to_vec(&PlaceOrder::new(15)).unwrap();
    let expected: Vec<u8> = plain.iter().map(|b| b ^ 0x5a).rev().collect();
    assert_eq!(envelope.message, expected);
}
