//! In-process queue backend (`memory://host/name`)
//!
//! Stores are process-wide and keyed by the queue address, so two buses in the
//! same process that name the same queue exchange messages. Receives use
//! peek-lock: a dequeued message stays in flight until it is acknowledged or
//! released back to the head of the queue.
//!
//! Options: `transactional=false` removes messages at dequeue time and
//! `journal=true` keeps a copy of every acknowledged payload.

use crate::core::sync::handle_mutex_poison;
use crate::queue::error::{QueueError, QueueResult};
use crate::queue::traits::{
    CreateQueue, DropQueue, PurgeQueue, Queue, QueueFactory, ReceiptToken, ReceivedMessage,
};
use crate::queue::uri::QueueUri;
use once_cell::sync::Lazy;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const MEMORY_SCHEME: &str = "memory";

static STORES: Lazy<Mutex<HashMap<String, Arc<MemoryStore>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

fn lock_error(message: String) -> QueueError {
    QueueError::OperationFailed { message }
}

#[derive(Debug, Clone)]
struct StoredMessage {
    id: Uuid,
    payload: Vec<u8>,
}

#[derive(Debug, Default)]
struct StoreState {
    pending: VecDeque<StoredMessage>,
    in_flight: HashMap<ReceiptToken, StoredMessage>,
    journal: Vec<StoredMessage>,
    next_token: ReceiptToken,
}

#[derive(Debug, Default)]
struct MemoryStore {
    state: Mutex<StoreState>,
    available: Condvar,
}

impl MemoryStore {
    fn lock(&self) -> QueueResult<MutexGuard<'_, StoreState>> {
        handle_mutex_poison(self.state.lock(), lock_error)
    }
}

fn store(address: &str) -> QueueResult<Arc<MemoryStore>> {
    let mut stores = handle_mutex_poison(STORES.lock(), lock_error)?;
    Ok(stores
        .entry(address.to_string())
        .or_insert_with(|| Arc::new(MemoryStore::default()))
        .clone())
}

fn remove_store(address: &str) -> QueueResult<Option<Arc<MemoryStore>>> {
    let mut stores = handle_mutex_poison(STORES.lock(), lock_error)?;
    Ok(stores.remove(address))
}

/// Queue over a process-wide in-memory store
#[derive(Debug)]
pub struct MemoryQueue {
    uri: QueueUri,
    address: String,
    transactional: bool,
    journal: bool,
    interrupted: AtomicBool,
}

impl MemoryQueue {
    pub fn new(uri: QueueUri) -> Self {
        let address = uri.address();
        let transactional = uri.bool_parameter("transactional", true);
        let journal = uri.bool_parameter("journal", false);
        Self {
            uri,
            address,
            transactional,
            journal,
            interrupted: AtomicBool::new(false),
        }
    }

    pub fn is_transactional(&self) -> bool {
        self.transactional
    }

    /// Messages waiting to be received
    pub fn pending_count(&self) -> QueueResult<usize> {
        let store = store(&self.address)?;
        let state = store.lock()?;
        Ok(state.pending.len())
    }

    /// Messages received but neither acknowledged nor released
    pub fn in_flight_count(&self) -> QueueResult<usize> {
        let store = store(&self.address)?;
        let state = store.lock()?;
        Ok(state.in_flight.len())
    }

    /// Ids of acknowledged messages kept when `journal=true`
    pub fn journaled_ids(&self) -> QueueResult<Vec<Uuid>> {
        let store = store(&self.address)?;
        let state = store.lock()?;
        Ok(state.journal.iter().map(|m| m.id).collect())
    }
}

impl Queue for MemoryQueue {
    fn uri(&self) -> &QueueUri {
        &self.uri
    }

    fn queue_type(&self) -> &str {
        MEMORY_SCHEME
    }

    fn enqueue(&self, message_id: Uuid, payload: &[u8]) -> QueueResult<()> {
        let store = store(&self.address)?;
        let mut state = store.lock()?;
        state.pending.push_back(StoredMessage {
            id: message_id,
            payload: payload.to_vec(),
        });
        drop(state);
        store.available.notify_one();
        Ok(())
    }

    fn dequeue(&self, timeout: Duration) -> QueueResult<Option<ReceivedMessage>> {
        let store = store(&self.address)?;
        let deadline = Instant::now() + timeout;
        let mut state = store.lock()?;

        loop {
            if self.interrupted.load(Ordering::Acquire) {
                return Ok(None);
            }

            if let Some(message) = state.pending.pop_front() {
                state.next_token += 1;
                let token = state.next_token;
                let payload = message.payload.clone();
                if self.transactional {
                    state.in_flight.insert(token, message);
                } else if self.journal {
                    state.journal.push(message);
                }
                return Ok(Some(ReceivedMessage { payload, token }));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            let (guard, _) = store
                .available
                .wait_timeout(state, deadline - now)
                .map_err(|e| lock_error(format!("memory queue wait failed: {}", e)))?;
            state = guard;
        }
    }

    fn acknowledge(&self, token: ReceiptToken) -> QueueResult<()> {
        if !self.transactional {
            return Ok(());
        }
        let store = store(&self.address)?;
        let mut state = store.lock()?;
        let message = state
            .in_flight
            .remove(&token)
            .ok_or_else(|| QueueError::UnknownReceipt {
                uri: self.uri.to_string(),
                token,
            })?;
        if self.journal {
            state.journal.push(message);
        }
        Ok(())
    }

    fn release(&self, token: ReceiptToken) -> QueueResult<()> {
        if !self.transactional {
            return Ok(());
        }
        let store = store(&self.address)?;
        let mut state = store.lock()?;
        let message = state
            .in_flight
            .remove(&token)
            .ok_or_else(|| QueueError::UnknownReceipt {
                uri: self.uri.to_string(),
                token,
            })?;
        state.pending.push_front(message);
        drop(state);
        store.available.notify_one();
        Ok(())
    }

    fn is_empty(&self) -> QueueResult<bool> {
        let store = store(&self.address)?;
        let state = store.lock()?;
        Ok(state.pending.is_empty())
    }

    fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        if let Ok(store) = store(&self.address) {
            // Take the lock so a waiter between its flag check and wait sees the notify
            let _guard = store.state.lock();
            store.available.notify_all();
        }
    }

    fn resume(&self) {
        self.interrupted.store(false, Ordering::Release);
    }

    fn as_create(&self) -> Option<&dyn CreateQueue> {
        Some(self)
    }

    fn as_drop(&self) -> Option<&dyn DropQueue> {
        Some(self)
    }

    fn as_purge(&self) -> Option<&dyn PurgeQueue> {
        Some(self)
    }
}

impl CreateQueue for MemoryQueue {
    fn create(&self) -> QueueResult<()> {
        store(&self.address).map(|_| ())
    }
}

impl DropQueue for MemoryQueue {
    fn drop_queue(&self) -> QueueResult<()> {
        if let Some(store) = remove_store(&self.address)? {
            store.available.notify_all();
        }
        Ok(())
    }
}

impl PurgeQueue for MemoryQueue {
    fn purge(&self) -> QueueResult<()> {
        let store = store(&self.address)?;
        let mut state = store.lock()?;
        state.pending.clear();
        Ok(())
    }
}

/// Factory for `memory://` queues
#[derive(Debug, Default)]
pub struct MemoryQueueFactory;

impl QueueFactory for MemoryQueueFactory {
    fn scheme(&self) -> &str {
        MEMORY_SCHEME
    }

    fn create(&self, uri: &QueueUri) -> QueueResult<Arc<dyn Queue>> {
        if uri.queue_name().is_empty() {
            return Err(QueueError::invalid_uri(uri.as_str(), "memory queues need a queue name"));
        }
        Ok(Arc::new(MemoryQueue::new(uri.clone())))
    }
}

fn memory_queue_factory() -> QueueResult<Box<dyn QueueFactory>> {
    Ok(Box::new(MemoryQueueFactory))
}

crate::queue_factory!("memory", memory_queue_factory);
