//! Tests for the inbox and control inbox receive pipelines

use crate::bus::collaborators::{
    MemoryIdempotenceTracker, TransactionScope, TransactionScopeFactory,
};
use crate::bus::error::BusResult;
use crate::bus::handlers::HandlerRegistry;
use crate::bus::tests::{
    body, builder, bus, drain, drain_payloads, enqueue_envelope, envelope, in_flight, is_empty,
    memory_uri, queue, record, Endpoint, OrderAccepted, PlaceOrder, ReverseCompression,
    XorEncryption,
};
use crate::pipeline::ExecutionStatus;
use crate::pipelines::PipelineKind;
use crate::worker::{WorkerStarted, WorkerStopped};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

type Outcomes = Arc<Mutex<Vec<bool>>>;

/// Records, on dispose, whether each scope was completed
struct RecordingScope {
    completed: bool,
    outcomes: Outcomes,
}

impl TransactionScope for RecordingScope {
    fn complete(&mut self) -> BusResult<()> {
        self.completed = true;
        Ok(())
    }

    fn is_completed(&self) -> bool {
        self.completed
    }

    fn dispose(&mut self) -> BusResult<()> {
        self.outcomes.lock().unwrap().push(self.completed);
        Ok(())
    }
}

struct RecordingScopeFactory(Outcomes);

impl TransactionScopeFactory for RecordingScopeFactory {
    fn create(&self) -> BusResult<Box<dyn TransactionScope>> {
        Ok(Box::new(RecordingScope {
            completed: false,
            outcomes: Arc::clone(&self.0),
        }))
    }
}

#[test]
fn test_handled_message_is_acknowledged() {
    let endpoint = Endpoint::new("receive-ack");
    let handlers = Arc::new(HandlerRegistry::new());
    let received = record::<PlaceOrder>(&handlers);
    let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
    let bus = bus(builder(&handlers)
        .with_inbox(endpoint.inbox())
        .with_transaction_scope_factory(Arc::new(RecordingScopeFactory(outcomes.clone()))));
    bus.send_local(&PlaceOrder::new(1)).unwrap();

    let outcome = bus.process_once(PipelineKind::InboxReceive).unwrap();

    assert_eq!(outcome.status, ExecutionStatus::Completed);
    assert!(outcome.working);
    assert!(!outcome.failed);
    assert_eq!(*received.lock().unwrap(), vec![PlaceOrder::new(1)]);
    assert_eq!(*outcomes.lock().unwrap(), vec![true]);
    assert!(is_empty(&endpoint.inbox_work));
    assert_eq!(in_flight(&endpoint.inbox_work), 0);
}

#[test]
fn test_empty_queue_aborts_without_work() {
    let endpoint = Endpoint::new("receive-empty");
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers).with_inbox(endpoint.inbox()));

    let outcome = bus.process_once(PipelineKind::InboxReceive).unwrap();

    assert_eq!(outcome.status, ExecutionStatus::Aborted);
    assert!(!outcome.working);
    assert!(!outcome.failed);
}

#[test]
fn test_failing_handler_releases_message_for_redelivery() {
    let endpoint = Endpoint::new("receive-failure");
    let handlers = Arc::new(HandlerRegistry::new());
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    handlers
        .register_fn::<PlaceOrder, _>(move |_context, _order| {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("inventory service unavailable".into())
        })
        .unwrap();
    let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
    let bus = bus(builder(&handlers)
        .with_inbox(endpoint.inbox())
        .with_transaction_scope_factory(Arc::new(RecordingScopeFactory(outcomes.clone()))));
    let sent = bus.send_local(&PlaceOrder::new(2)).unwrap();

    let outcome = bus.process_once(PipelineKind::InboxReceive).unwrap();

    assert_eq!(outcome.status, ExecutionStatus::Aborted);
    assert!(outcome.working);
    assert!(outcome.failed);
    assert_eq!(*outcomes.lock().unwrap(), vec![false]);
    assert_eq!(in_flight(&endpoint.inbox_work), 0);
    assert!(is_empty(&endpoint.inbox_error));

    // Released, so the same message is received again
    bus.process_once(PipelineKind::InboxReceive).unwrap();
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    let remaining = drain(&endpoint.inbox_work);
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].message_id(), sent.message_id());
}

#[test]
fn test_panicking_handler_releases_message_for_redelivery() {
    let endpoint = Endpoint::new("receive-panic");
    let handlers = Arc::new(HandlerRegistry::new());
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    handlers
        .register_fn::<PlaceOrder, _>(move |_context, order| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("order {} crashed the handler", order.order_id);
            }
            Ok(())
        })
        .unwrap();
    let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
    let bus = bus(builder(&handlers)
        .with_inbox(endpoint.inbox())
        .with_transaction_scope_factory(Arc::new(RecordingScopeFactory(outcomes.clone()))));
    bus.send_local(&PlaceOrder::new(9)).unwrap();

    let outcome = bus.process_once(PipelineKind::InboxReceive).unwrap();

    assert!(outcome.failed);
    assert_eq!(*outcomes.lock().unwrap(), vec![false]);
    assert_eq!(in_flight(&endpoint.inbox_work), 0);
    assert!(!is_empty(&endpoint.inbox_work));

    let outcome = bus.process_once(PipelineKind::InboxReceive).unwrap();
    assert!(!outcome.failed);
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert!(is_empty(&endpoint.inbox_work));
    assert_eq!(in_flight(&endpoint.inbox_work), 0);
}

#[test]
fn test_message_without_handler_is_released() {
    let endpoint = Endpoint::new("receive-unhandled");
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers).with_inbox(endpoint.inbox()));
    bus.send_local(&PlaceOrder::new(3)).unwrap();

    let outcome = bus.process_once(PipelineKind::InboxReceive).unwrap();

    assert!(outcome.failed);
    assert!(!is_empty(&endpoint.inbox_work));
    assert_eq!(in_flight(&endpoint.inbox_work), 0);
}

#[test]
fn test_undecodable_payload_moves_to_error_queue() {
    let endpoint = Endpoint::new("receive-poison");
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers).with_inbox(endpoint.inbox()));
    queue(&endpoint.inbox_work)
        .enqueue(Uuid::new_v4(), b"not an envelope")
        .unwrap();

    let outcome = bus.process_once(PipelineKind::InboxReceive).unwrap();

    assert_eq!(outcome.status, ExecutionStatus::Aborted);
    assert!(outcome.working);
    assert!(is_empty(&endpoint.inbox_work));
    assert_eq!(in_flight(&endpoint.inbox_work), 0);
    assert_eq!(drain_payloads(&endpoint.inbox_error), vec![b"not an envelope".to_vec()]);
}

#[test]
fn test_redelivered_duplicate_is_skipped() {
    let endpoint = Endpoint::new("receive-idempotent");
    let handlers = Arc::new(HandlerRegistry::new());
    let received = record::<PlaceOrder>(&handlers);
    let bus = bus(builder(&handlers)
        .with_inbox(endpoint.inbox())
        .with_idempotence_tracker(Arc::new(MemoryIdempotenceTracker::new())));
    let duplicate = envelope(&PlaceOrder::new(4), None);
    enqueue_envelope(&endpoint.inbox_work, &duplicate);
    enqueue_envelope(&endpoint.inbox_work, &duplicate);

    let first = bus.process_once(PipelineKind::InboxReceive).unwrap();
    let second = bus.process_once(PipelineKind::InboxReceive).unwrap();

    assert_eq!(first.status, ExecutionStatus::Completed);
    assert_eq!(second.status, ExecutionStatus::Completed);
    assert_eq!(received.lock().unwrap().len(), 1);
    assert!(is_empty(&endpoint.inbox_work));
}

#[test]
fn test_handler_reply_reaches_the_sender() {
    let endpoint = Endpoint::new("receive-reply");
    let client = memory_uri("receive-reply-client");
    let handlers = Arc::new(HandlerRegistry::new());
    handlers
        .register_fn::<PlaceOrder, _>(|context, order| {
            context.send_reply(&OrderAccepted {
                order_id: order.order_id,
            })?;
            Ok(())
        })
        .unwrap();
    let bus = bus(builder(&handlers).with_inbox(endpoint.inbox()));
    let mut request = envelope(&PlaceOrder::new(5), Some(&client));
    request.correlation_id = "order-5".to_string();
    request.add_header("tenant", "acme");
    enqueue_envelope(&endpoint.inbox_work, &request);

    bus.process_once(PipelineKind::InboxReceive).unwrap();

    let replies = drain(&client);
    assert_eq!(replies.len(), 1);
    let reply = &replies[0];
    assert_eq!(body::<OrderAccepted>(reply), OrderAccepted { order_id: 5 });
    assert_eq!(reply.correlation_id, "order-5");
    assert_eq!(reply.header("tenant"), Some("acme"));
    assert_eq!(reply.message_received_id, Some(request.message_id()));
    assert_eq!(
        reply.sender_inbox_work_queue_uri.as_deref(),
        Some(endpoint.inbox_work.as_str())
    );
}

#[test]
fn test_encrypted_and_compressed_body_is_restored() {
    let endpoint = Endpoint::new("receive-algorithms");
    let handlers = Arc::new(HandlerRegistry::new());
    let received = record::<PlaceOrder>(&handlers);
    let bus = bus(builder(&handlers)
        .with_inbox(endpoint.inbox())
        .register_encryption_algorithm(Arc::new(XorEncryption))
        .register_compression_algorithm(Arc::new(ReverseCompression))
        .encrypt_with("xor")
        .compress_with("reverse"));
    bus.send_local(&PlaceOrder::new(6)).unwrap();

    let outcome = bus.process_once(PipelineKind::InboxReceive).unwrap();

    assert!(!outcome.failed);
    assert_eq!(*received.lock().unwrap(), vec![PlaceOrder::new(6)]);
}

#[test]
fn test_control_inbox_tracks_worker_registration() {
    let endpoint = Endpoint::new("receive-control");
    let worker = memory_uri("receive-control-worker");
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers)
        .with_inbox(crate::bus::settings::InboxSettings {
            distribute: true,
            ..endpoint.inbox()
        })
        .with_control_inbox(endpoint.control_inbox()));
    let availability = bus.context().worker_availability();

    bus.send_to(
        &endpoint.control_work,
        &WorkerStarted {
            inbox_work_queue_uri: worker.clone(),
        },
    )
    .unwrap();
    bus.process_once(PipelineKind::ControlInboxReceive).unwrap();
    assert_eq!(availability.workers(), vec![worker.clone()]);

    bus.send_to(
        &endpoint.control_work,
        &WorkerStopped {
            inbox_work_queue_uri: worker.to_uppercase(),
        },
    )
    .unwrap();
    bus.process_once(PipelineKind::ControlInboxReceive).unwrap();
    assert!(!availability.has_workers());
    assert!(is_empty(&endpoint.control_work));
}
