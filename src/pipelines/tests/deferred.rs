//! Tests for the deferred queue sweep

use crate::bus::handlers::HandlerRegistry;
use crate::bus::tests::{builder, bus, drain, is_empty, memory_uri, record, Endpoint, PlaceOrder};
use crate::core::time::ManualClock;
use crate::pipelines::{DeferredOutcome, PipelineKind};
use crate::worker::{ActivitySignal, DeferredMessageProcessor, Processor};
use chrono::Duration;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

#[test]
fn test_message_is_requeued_until_due_then_forwarded() {
    let endpoint = Endpoint::new("deferred-sweep");
    let target = memory_uri("deferred-sweep-target");
    let clock = ManualClock::starting_now();
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers)
        .with_inbox(endpoint.inbox_with_deferred())
        .with_clock(Arc::new(clock.clone())));
    let at = bus.configuration().clock().now() + Duration::minutes(10);
    let sent = bus.send_deferred(at, &PlaceOrder::new(1), Some(&target)).unwrap();

    let early = bus.process_once(PipelineKind::DeferredReceive).unwrap();

    assert_eq!(early.deferred, Some(DeferredOutcome::Requeued(sent.message_id())));
    assert!(is_empty(&target));
    assert!(!is_empty(&endpoint.deferred));

    clock.advance(Duration::minutes(11));
    let due = bus.process_once(PipelineKind::DeferredReceive).unwrap();

    assert_eq!(due.deferred, Some(DeferredOutcome::Forwarded(sent.message_id())));
    assert!(is_empty(&endpoint.deferred));
    let delivered = drain(&target);
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].message_id(), sent.message_id());
}

#[test]
fn test_deferred_local_message_is_handled_once_due() {
    let endpoint = Endpoint::new("deferred-local");
    let clock = ManualClock::starting_now();
    let handlers = Arc::new(HandlerRegistry::new());
    let received = record::<PlaceOrder>(&handlers);
    let bus = bus(builder(&handlers)
        .with_inbox(endpoint.inbox_with_deferred())
        .with_clock(Arc::new(clock.clone())));
    let at = bus.configuration().clock().now() + Duration::seconds(30);
    bus.send_deferred_local(at, &PlaceOrder::new(2)).unwrap();

    assert!(is_empty(&endpoint.inbox_work));
    let inbox = bus.process_once(PipelineKind::InboxReceive).unwrap();
    assert!(!inbox.working);

    clock.advance(Duration::seconds(31));
    bus.process_once(PipelineKind::DeferredReceive).unwrap();
    bus.process_once(PipelineKind::InboxReceive).unwrap();

    assert_eq!(*received.lock().unwrap(), vec![PlaceOrder::new(2)]);
}

#[test]
fn test_due_message_passes_through_the_outbox() {
    let endpoint = Endpoint::new("deferred-outbox");
    let target = memory_uri("deferred-outbox-target");
    let clock = ManualClock::starting_now();
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers)
        .with_inbox(endpoint.inbox_with_deferred())
        .with_outbox(endpoint.outbox())
        .with_clock(Arc::new(clock.clone())));
    let at = bus.configuration().clock().now() + Duration::minutes(1);
    bus.send_deferred(at, &PlaceOrder::new(3), Some(&target)).unwrap();
    assert!(is_empty(&endpoint.outbox_work));

    clock.advance(Duration::minutes(2));
    bus.process_once(PipelineKind::DeferredReceive).unwrap();

    assert!(is_empty(&target));
    assert_eq!(drain(&endpoint.outbox_work).len(), 1);
}

#[test]
fn test_processor_pauses_after_a_full_sweep() {
    let endpoint = Endpoint::new("deferred-pause");
    let target = memory_uri("deferred-pause-target");
    let clock = ManualClock::starting_now();
    let handlers = Arc::new(HandlerRegistry::new());
    let bus = bus(builder(&handlers)
        .with_inbox(endpoint.inbox_with_deferred())
        .with_clock(Arc::new(clock.clone())));
    let at = bus.configuration().clock().now() + Duration::hours(1);
    bus.send_deferred(at, &PlaceOrder::new(4), Some(&target)).unwrap();
    bus.send_deferred(at, &PlaceOrder::new(5), Some(&target)).unwrap();

    let pause = StdDuration::from_millis(300);
    let mut processor =
        DeferredMessageProcessor::new(Arc::clone(bus.context()), vec![StdDuration::from_millis(1)], pause);
    let signal = ActivitySignal::new();

    // First pass requeues both messages without pausing
    let started = Instant::now();
    processor.execute(&signal);
    processor.execute(&signal);
    assert!(started.elapsed() < pause);

    // Meeting the first message again completes the sweep
    let started = Instant::now();
    processor.execute(&signal);
    assert!(started.elapsed() >= pause);

    assert!(is_empty(&target));
    assert_eq!(drain(&endpoint.deferred).len(), 2);
}
