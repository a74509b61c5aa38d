//! Distributor worker registry and the control messages that feed it

use crate::core::sync::handle_mutex_poison;
use crate::bus::error::{BusResult, ServiceBusError};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Sent by a worker to its distributor's control inbox when it starts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStarted {
    pub inbox_work_queue_uri: String,
}

/// Sent by a worker to its distributor's control inbox when it stops
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStopped {
    pub inbox_work_queue_uri: String,
}

#[derive(Debug, Default)]
struct Workers {
    uris: Vec<String>,
    cursor: usize,
}

/// Known worker inboxes with a round-robin cursor
#[derive(Debug, Default)]
pub struct WorkerAvailability {
    workers: Mutex<Workers>,
}

fn lock_error(message: String) -> ServiceBusError {
    ServiceBusError::Synchronisation { message }
}

impl WorkerAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker inbox; `false` when it was already known
    pub fn register(&self, uri: &str) -> BusResult<bool> {
        let mut workers = handle_mutex_poison(self.workers.lock(), lock_error)?;
        if workers.uris.iter().any(|u| u.eq_ignore_ascii_case(uri)) {
            return Ok(false);
        }
        workers.uris.push(uri.to_string());
        log::info!("Worker '{}' is available ({} known)", uri, workers.uris.len());
        Ok(true)
    }

    pub fn unregister(&self, uri: &str) -> BusResult<bool> {
        let mut workers = handle_mutex_poison(self.workers.lock(), lock_error)?;
        let Some(index) = workers.uris.iter().position(|u| u.eq_ignore_ascii_case(uri)) else {
            return Ok(false);
        };
        workers.uris.remove(index);
        if index < workers.cursor {
            workers.cursor -= 1;
        }
        if workers.cursor >= workers.uris.len() {
            workers.cursor = 0;
        }
        log::info!("Worker '{}' removed ({} known)", uri, workers.uris.len());
        Ok(true)
    }

    /// Next worker in rotation, `None` when no worker is known
    pub fn next(&self) -> BusResult<Option<String>> {
        let mut workers = handle_mutex_poison(self.workers.lock(), lock_error)?;
        if workers.uris.is_empty() {
            return Ok(None);
        }
        let index = workers.cursor % workers.uris.len();
        workers.cursor = (index + 1) % workers.uris.len();
        Ok(Some(workers.uris[index].clone()))
    }

    pub fn has_workers(&self) -> bool {
        self.workers
            .lock()
            .map(|workers| !workers.uris.is_empty())
            .unwrap_or(false)
    }

    pub fn workers(&self) -> Vec<String> {
        self.workers
            .lock()
            .map(|workers| workers.uris.clone())
            .unwrap_or_default()
    }
}
