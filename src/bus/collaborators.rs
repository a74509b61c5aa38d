//! Pluggable collaborator contracts and their default implementations

use crate::bus::error::{BoxError, BusResult, ServiceBusError};
use crate::bus::service_bus::ServiceBus;
use crate::core::sync::{handle_mutex_poison, handle_rwlock_read, handle_rwlock_write};
use crate::pipeline::PipelineBuilder;
use crate::pipelines::PipelineKind;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, RwLock};
use uuid::Uuid;

fn lock_error(message: String) -> ServiceBusError {
    ServiceBusError::Synchronisation { message }
}

/// Maps a business message to candidate destination uris
pub trait MessageRouteProvider: Send + Sync {
    fn get_route_uris(&self, message_type: &str, message: &serde_json::Value) -> Vec<String>;
}

/// Looks up the subscribers of a message type
pub trait SubscriptionManager: Send + Sync {
    fn get_subscribed_uris(&self, message_type: &str) -> Vec<String>;
}

/// In-process subscription table
#[derive(Debug, Default)]
pub struct MemorySubscriptionManager {
    subscriptions: RwLock<HashMap<String, Vec<String>>>,
}

impl MemorySubscriptionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `uri` to `message_type`; repeated subscriptions are ignored
    pub fn subscribe(&self, message_type: &str, uri: &str) -> BusResult<()> {
        let mut subscriptions = handle_rwlock_write(self.subscriptions.write(), lock_error)?;
        let uris = subscriptions.entry(message_type.to_string()).or_default();
        if !uris.iter().any(|existing| existing.eq_ignore_ascii_case(uri)) {
            uris.push(uri.to_string());
        }
        Ok(())
    }
}

impl SubscriptionManager for MemorySubscriptionManager {
    fn get_subscribed_uris(&self, message_type: &str) -> Vec<String> {
        match handle_rwlock_read(self.subscriptions.read(), lock_error) {
            Ok(subscriptions) => subscriptions.get(message_type).cloned().unwrap_or_default(),
            Err(e) => {
                log::error!("Subscription lookup failed: {}", e);
                Vec::new()
            }
        }
    }
}

/// Records processed message ids so redelivered duplicates are not handled twice
pub trait IdempotenceTracker: Send + Sync {
    fn has_processed(&self, message_id: Uuid) -> BusResult<bool>;

    fn record_processed(&self, message_id: Uuid) -> BusResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryIdempotenceTracker {
    processed: Mutex<HashSet<Uuid>>,
}

impl MemoryIdempotenceTracker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdempotenceTracker for MemoryIdempotenceTracker {
    fn has_processed(&self, message_id: Uuid) -> BusResult<bool> {
        let processed = handle_mutex_poison(self.processed.lock(), lock_error)?;
        Ok(processed.contains(&message_id))
    }

    fn record_processed(&self, message_id: Uuid) -> BusResult<()> {
        let mut processed = handle_mutex_poison(self.processed.lock(), lock_error)?;
        processed.insert(message_id);
        Ok(())
    }
}

/// Unit of work spanning a dequeue and the handler's side effects
pub trait TransactionScope: Send {
    fn complete(&mut self) -> BusResult<()>;

    fn is_completed(&self) -> bool;

    /// Release the scope; an incomplete scope rolls back
    fn dispose(&mut self) -> BusResult<()> {
        Ok(())
    }
}

pub trait TransactionScopeFactory: Send + Sync {
    fn create(&self) -> BusResult<Box<dyn TransactionScope>>;
}

/// Scope that only records whether it was completed
#[derive(Debug, Default)]
pub struct DefaultTransactionScope {
    completed: bool,
}

impl TransactionScope for DefaultTransactionScope {
    fn complete(&mut self) -> BusResult<()> {
        self.completed = true;
        Ok(())
    }

    fn is_completed(&self) -> bool {
        self.completed
    }
}

#[derive(Debug, Default)]
pub struct DefaultTransactionScopeFactory;

impl TransactionScopeFactory for DefaultTransactionScopeFactory {
    fn create(&self) -> BusResult<Box<dyn TransactionScope>> {
        Ok(Box::new(DefaultTransactionScope::default()))
    }
}

pub trait CompressionAlgorithm: Send + Sync {
    fn name(&self) -> &str;

    fn compress(&self, bytes: &[u8]) -> Result<Vec<u8>, BoxError>;

    fn decompress(&self, bytes: &[u8]) -> Result<Vec<u8>, BoxError>;
}

pub trait EncryptionAlgorithm: Send + Sync {
    fn name(&self) -> &str;

    fn encrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, BoxError>;

    fn decrypt(&self, bytes: &[u8]) -> Result<Vec<u8>, BoxError>;
}

/// Extension point with access to the bus lifecycle and pipeline assembly
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    /// Called once by `ServiceBus::start` before any pipeline runs
    fn initialize(&self, _bus: &ServiceBus) -> BusResult<()> {
        Ok(())
    }

    /// Called when a pipeline type is first assembled
    fn configure_pipeline(&self, _kind: PipelineKind, _builder: &mut PipelineBuilder) {}

    /// Called by `ServiceBus::stop` before the thread pools are disposed
    fn dispose(&self) {}
}
