//! Tests for the in-memory backend

use super::unique_memory_uri;
use crate::queue::api::{MemoryQueue, Queue, QueueError, QueueManager, QueueUri};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

fn memory_queue(uri: &str) -> MemoryQueue {
    MemoryQueue::new(QueueUri::parse(uri).unwrap())
}

#[test]
fn test_fifo_order() {
    let queue = memory_queue(&unique_memory_uri("fifo"));
    queue.enqueue(Uuid::new_v4(), b"first").unwrap();
    queue.enqueue(Uuid::new_v4(), b"second").unwrap();

    let first = queue.dequeue(Duration::ZERO).unwrap().unwrap();
    let second = queue.dequeue(Duration::ZERO).unwrap().unwrap();

    assert_eq!(first.payload, b"first");
    assert_eq!(second.payload, b"second");
}

#[test]
fn test_empty_dequeue_times_out_with_none() {
    let queue = memory_queue(&unique_memory_uri("empty"));
    let started = Instant::now();

    assert!(queue.dequeue(Duration::from_millis(30)).unwrap().is_none());
    assert!(started.elapsed() >= Duration::from_millis(25));
}

#[test]
fn test_release_returns_message_to_head() {
    let queue = memory_queue(&unique_memory_uri("release"));
    queue.enqueue(Uuid::new_v4(), b"a").unwrap();
    queue.enqueue(Uuid::new_v4(), b"b").unwrap();

    let received = queue.dequeue(Duration::ZERO).unwrap().unwrap();
    assert_eq!(queue.in_flight_count().unwrap(), 1);

    queue.release(received.token).unwrap();
    assert_eq!(queue.in_flight_count().unwrap(), 0);

    let again = queue.dequeue(Duration::ZERO).unwrap().unwrap();
    assert_eq!(again.payload, b"a");
}

#[test]
fn test_acknowledge_removes_and_journals() {
    let uri = format!("{}?journal=true", unique_memory_uri("journal"));
    let queue = memory_queue(&uri);
    let id = Uuid::new_v4();
    queue.enqueue(id, b"payload").unwrap();

    let received = queue.dequeue(Duration::ZERO).unwrap().unwrap();
    queue.acknowledge(received.token).unwrap();

    assert!(queue.is_empty().unwrap());
    assert_eq!(queue.in_flight_count().unwrap(), 0);
    assert_eq!(queue.journaled_ids().unwrap(), vec![id]);
}

#[test]
fn test_unknown_receipt_is_an_error() {
    let queue = memory_queue(&unique_memory_uri("receipt"));
    assert!(matches!(
        queue.acknowledge(42).unwrap_err(),
        QueueError::UnknownReceipt { token: 42, .. }
    ));
}

#[test]
fn test_non_transactional_dequeue_removes_immediately() {
    let uri = format!("{}?transactional=false", unique_memory_uri("nontx"));
    let queue = memory_queue(&uri);
    assert!(!queue.is_transactional());
    queue.enqueue(Uuid::new_v4(), b"gone").unwrap();

    let received = queue.dequeue(Duration::ZERO).unwrap().unwrap();
    queue.release(received.token).unwrap();

    assert!(queue.is_empty().unwrap());
    assert_eq!(queue.in_flight_count().unwrap(), 0);
}

#[test]
fn test_queues_with_same_address_share_a_store() {
    let uri = unique_memory_uri("shared");
    let sender = memory_queue(&uri);
    let receiver = memory_queue(&format!("{}?journal=true", uri.to_uppercase()));

    sender.enqueue(Uuid::new_v4(), b"hello").unwrap();
    assert_eq!(receiver.pending_count().unwrap(), 1);
}

#[test]
fn test_blocked_dequeue_wakes_on_enqueue() {
    let manager = QueueManager::new();
    let queue = manager.get_queue(&unique_memory_uri("wake")).unwrap();
    let producer = queue.clone();

    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        producer.enqueue(Uuid::new_v4(), b"late").unwrap();
    });

    let received = queue.dequeue(Duration::from_secs(5)).unwrap();
    handle.join().unwrap();
    assert_eq!(received.unwrap().payload, b"late");
}

#[test]
fn test_interrupt_wakes_blocked_receiver() {
    let queue = Arc::new(memory_queue(&unique_memory_uri("interrupt")));
    let receiver = Arc::clone(&queue);

    let handle = thread::spawn(move || {
        let started = Instant::now();
        let result = receiver.dequeue(Duration::from_secs(10)).unwrap();
        (result, started.elapsed())
    });

    thread::sleep(Duration::from_millis(30));
    queue.interrupt();

    let (result, elapsed) = handle.join().unwrap();
    assert!(result.is_none());
    assert!(elapsed < Duration::from_secs(5));
}

#[test]
fn test_resume_after_interrupt_receives_again() {
    let queue = memory_queue(&unique_memory_uri("resume"));
    queue.enqueue(Uuid::new_v4(), b"waiting").unwrap();

    queue.interrupt();
    assert!(queue.dequeue(Duration::from_millis(10)).unwrap().is_none());

    queue.resume();
    let received = queue.dequeue(Duration::from_millis(100)).unwrap();
    assert_eq!(received.unwrap().payload, b"waiting");
}
