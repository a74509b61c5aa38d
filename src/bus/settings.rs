//! TOML settings document
//!
//! ```toml
//! create_queues = true
//! dequeue_timeout_ms = 1000
//!
//! [inbox]
//! work_queue_uri = "memory://./orders-inbox-work"
//! error_queue_uri = "memory://./orders-inbox-error"
//! deferred_queue_uri = "memory://./orders-inbox-deferred"
//! thread_count = 2
//!
//! [[message_routes]]
//! uri = "memory://./billing-inbox-work"
//! specifications = [{ kind = "starts_with", value = "billing::" }]
//! ```

use crate::bus::error::{BusResult, ServiceBusError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

fn default_thread_count() -> usize {
    1
}

fn default_idle_durations() -> Vec<u64> {
    vec![250, 500, 1000, 5000]
}

fn default_true() -> bool {
    true
}

fn default_dequeue_timeout_ms() -> u64 {
    1000
}

fn default_sweep_pause_ms() -> u64 {
    1000
}

fn default_notification_interval() -> u64 {
    15
}

/// Work/error queue pair processed by a pool of threads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default)]
    pub work_queue_uri: Option<String>,
    #[serde(default)]
    pub error_queue_uri: Option<String>,
    #[serde(default = "default_thread_count")]
    pub thread_count: usize,
    #[serde(default = "default_idle_durations")]
    pub duration_to_sleep_when_idle_ms: Vec<u64>,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            work_queue_uri: None,
            error_queue_uri: None,
            thread_count: default_thread_count(),
            duration_to_sleep_when_idle_ms: default_idle_durations(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboxSettings {
    #[serde(flatten)]
    pub queues: QueueSettings,
    #[serde(default)]
    pub deferred_queue_uri: Option<String>,
    /// Fan inbox work out to worker inboxes instead of handling it
    #[serde(default)]
    pub distribute: bool,
    /// Worker inbox uris known without a registration message
    #[serde(default)]
    pub distributor_workers: Vec<String>,
    #[serde(default = "default_sweep_pause_ms")]
    pub deferred_sweep_pause_ms: u64,
}

impl Default for InboxSettings {
    fn default() -> Self {
        Self {
            queues: QueueSettings::default(),
            deferred_queue_uri: None,
            distribute: false,
            distributor_workers: Vec::new(),
            deferred_sweep_pause_ms: default_sweep_pause_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub distributor_control_work_queue_uri: String,
    #[serde(default = "default_notification_interval")]
    pub thread_available_notification_interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum RouteSpecificationSettings {
    StartsWith(String),
    TypeList(Vec<String>),
    Regex(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRouteSettings {
    pub uri: String,
    #[serde(default)]
    pub specifications: Vec<RouteSpecificationSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusSettings {
    #[serde(default)]
    pub inbox: Option<InboxSettings>,
    #[serde(default)]
    pub control_inbox: Option<QueueSettings>,
    #[serde(default)]
    pub outbox: Option<QueueSettings>,
    #[serde(default)]
    pub worker: Option<WorkerSettings>,
    #[serde(default)]
    pub message_routes: Vec<MessageRouteSettings>,
    #[serde(default)]
    pub compression_algorithm: Option<String>,
    #[serde(default)]
    pub encryption_algorithm: Option<String>,
    #[serde(default = "default_true")]
    pub create_queues: bool,
    #[serde(default = "default_dequeue_timeout_ms")]
    pub dequeue_timeout_ms: u64,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            inbox: None,
            control_inbox: None,
            outbox: None,
            worker: None,
            message_routes: Vec::new(),
            compression_algorithm: None,
            encryption_algorithm: None,
            create_queues: true,
            dequeue_timeout_ms: default_dequeue_timeout_ms(),
        }
    }
}

impl BusSettings {
    pub fn from_toml_str(contents: &str) -> BusResult<Self> {
        toml::from_str(contents).map_err(|e| ServiceBusError::ConfigurationLoad {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> BusResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ServiceBusError::ConfigurationLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        toml::from_str(&contents).map_err(|e| ServiceBusError::ConfigurationLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// `<config dir>/Relaybus/relaybus.toml`, when the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Relaybus").join("relaybus.toml"))
    }
}
