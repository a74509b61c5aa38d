//! Runtime configuration
//!
//! [`ServiceBusConfiguration`] holds the resolved queue handles and every
//! collaborator. It is assembled with [`ServiceBusConfigurationBuilder`], either
//! from code or from a [`BusSettings`] document.

use crate::bus::collaborators::{
    CompressionAlgorithm, DefaultTransactionScopeFactory, EncryptionAlgorithm, IdempotenceTracker,
    MessageRouteProvider, Module, SubscriptionManager, TransactionScopeFactory,
};
use crate::bus::error::{BusResult, ServiceBusError};
use crate::bus::handlers::MessageHandlerFactory;
use crate::bus::settings::{BusSettings, InboxSettings, QueueSettings, WorkerSettings};
use crate::core::time::{Clock, SystemClock};
use crate::message::{JsonSerializer, Serializer};
use crate::queue::api::{QueueHandle, QueueManager};
use crate::routing::DefaultMessageRouteProvider;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Work/error queue pair with its processing settings
#[derive(Debug, Clone)]
pub struct QueueConfiguration {
    pub work_queue: Option<QueueHandle>,
    pub error_queue: Option<QueueHandle>,
    pub thread_count: usize,
    pub duration_to_sleep_when_idle: Vec<Duration>,
}

impl QueueConfiguration {
    fn resolve(manager: &QueueManager, settings: &QueueSettings) -> BusResult<Self> {
        Ok(Self {
            work_queue: resolve_queue(manager, settings.work_queue_uri.as_deref())?,
            error_queue: resolve_queue(manager, settings.error_queue_uri.as_deref())?,
            thread_count: settings.thread_count.max(1),
            duration_to_sleep_when_idle: settings
                .duration_to_sleep_when_idle_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct InboxConfiguration {
    pub queues: QueueConfiguration,
    pub deferred_queue: Option<QueueHandle>,
    pub distribute: bool,
    pub distributor_workers: Vec<String>,
    pub deferred_sweep_pause: Duration,
}

#[derive(Debug, Clone)]
pub struct WorkerConfiguration {
    pub distributor_control_work_queue_uri: String,
    pub distributor_control_work_queue: QueueHandle,
    pub thread_available_notification_interval: Duration,
}

fn resolve_queue(manager: &QueueManager, uri: Option<&str>) -> BusResult<Option<QueueHandle>> {
    match uri.map(str::trim).filter(|u| !u.is_empty()) {
        Some(uri) => Ok(Some(manager.get_queue(uri)?)),
        None => Ok(None),
    }
}

pub struct ServiceBusConfiguration {
    queue_manager: Arc<QueueManager>,
    inbox: Option<InboxConfiguration>,
    control_inbox: Option<QueueConfiguration>,
    outbox: Option<QueueConfiguration>,
    worker: Option<WorkerConfiguration>,
    serializer: Option<Arc<dyn Serializer>>,
    message_handler_factory: Option<Arc<dyn MessageHandlerFactory>>,
    message_route_provider: Arc<dyn MessageRouteProvider>,
    subscription_manager: Option<Arc<dyn SubscriptionManager>>,
    idempotence_tracker: Option<Arc<dyn IdempotenceTracker>>,
    transaction_scope_factory: Arc<dyn TransactionScopeFactory>,
    compression_algorithm: Option<String>,
    encryption_algorithm: Option<String>,
    compression_algorithms: HashMap<String, Arc<dyn CompressionAlgorithm>>,
    encryption_algorithms: HashMap<String, Arc<dyn EncryptionAlgorithm>>,
    modules: Vec<Arc<dyn Module>>,
    clock: Arc<dyn Clock>,
    dequeue_timeout: Duration,
    create_queues: bool,
    principal_identity_name: String,
}

impl ServiceBusConfiguration {
    pub fn builder() -> ServiceBusConfigurationBuilder {
        ServiceBusConfigurationBuilder::new()
    }

    pub fn queue_manager(&self) -> &Arc<QueueManager> {
        &self.queue_manager
    }

    pub fn inbox(&self) -> Option<&InboxConfiguration> {
        self.inbox.as_ref()
    }

    pub fn has_inbox(&self) -> bool {
        self.inbox.is_some()
    }

    pub fn control_inbox(&self) -> Option<&QueueConfiguration> {
        self.control_inbox.as_ref()
    }

    pub fn has_control_inbox(&self) -> bool {
        self.control_inbox.is_some()
    }

    pub fn outbox(&self) -> Option<&QueueConfiguration> {
        self.outbox.as_ref()
    }

    pub fn has_outbox(&self) -> bool {
        self.outbox.is_some()
    }

    pub fn worker(&self) -> Option<&WorkerConfiguration> {
        self.worker.as_ref()
    }

    pub fn is_worker(&self) -> bool {
        self.worker.is_some()
    }

    pub fn is_distributor(&self) -> bool {
        self.inbox.as_ref().is_some_and(|inbox| inbox.distribute)
    }

    pub fn deferred_queue(&self) -> Option<&QueueHandle> {
        self.inbox.as_ref().and_then(|inbox| inbox.deferred_queue.as_ref())
    }

    pub fn has_deferred_queue(&self) -> bool {
        self.deferred_queue().is_some()
    }

    /// Inbox work queue, the destination of local sends and replies to this node
    pub fn inbox_work_queue(&self) -> Option<&QueueHandle> {
        self.inbox.as_ref().and_then(|inbox| inbox.queues.work_queue.as_ref())
    }

    pub fn serializer(&self) -> BusResult<&Arc<dyn Serializer>> {
        self.serializer
            .as_ref()
            .ok_or_else(|| ServiceBusError::missing_dependency("serializer"))
    }

    pub fn message_handler_factory(&self) -> BusResult<&Arc<dyn MessageHandlerFactory>> {
        self.message_handler_factory
            .as_ref()
            .ok_or_else(|| ServiceBusError::missing_dependency("message handler factory"))
    }

    pub fn message_route_provider(&self) -> &Arc<dyn MessageRouteProvider> {
        &self.message_route_provider
    }

    pub fn subscription_manager(&self) -> Option<&Arc<dyn SubscriptionManager>> {
        self.subscription_manager.as_ref()
    }

    pub fn idempotence_tracker(&self) -> Option<&Arc<dyn IdempotenceTracker>> {
        self.idempotence_tracker.as_ref()
    }

    pub fn transaction_scope_factory(&self) -> &Arc<dyn TransactionScopeFactory> {
        &self.transaction_scope_factory
    }

    /// Name stamped on outgoing envelopes, empty when bodies are sent uncompressed
    pub fn compression_algorithm(&self) -> &str {
        self.compression_algorithm.as_deref().unwrap_or("")
    }

    pub fn encryption_algorithm(&self) -> &str {
        self.encryption_algorithm.as_deref().unwrap_or("")
    }

    pub fn find_compression_algorithm(&self, name: &str) -> BusResult<&Arc<dyn CompressionAlgorithm>> {
        self.compression_algorithms
            .get(&name.to_lowercase())
            .ok_or_else(|| ServiceBusError::AlgorithmNotFound {
                kind: "compression".to_string(),
                name: name.to_string(),
            })
    }

    pub fn find_encryption_algorithm(&self, name: &str) -> BusResult<&Arc<dyn EncryptionAlgorithm>> {
        self.encryption_algorithms
            .get(&name.to_lowercase())
            .ok_or_else(|| ServiceBusError::AlgorithmNotFound {
                kind: "encryption".to_string(),
                name: name.to_string(),
            })
    }

    pub fn modules(&self) -> &[Arc<dyn Module>] {
        &self.modules
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn dequeue_timeout(&self) -> Duration {
        self.dequeue_timeout
    }

    pub fn create_queues(&self) -> bool {
        self.create_queues
    }

    pub fn principal_identity_name(&self) -> &str {
        &self.principal_identity_name
    }

    /// Every queue handle named by the configuration
    pub fn configured_queues(&self) -> Vec<&QueueHandle> {
        let mut queues = Vec::new();
        if let Some(inbox) = &self.inbox {
            queues.extend(inbox.queues.work_queue.iter());
            queues.extend(inbox.queues.error_queue.iter());
            queues.extend(inbox.deferred_queue.iter());
        }
        for role in [&self.control_inbox, &self.outbox].into_iter().flatten() {
            queues.extend(role.work_queue.iter());
            queues.extend(role.error_queue.iter());
        }
        if let Some(worker) = &self.worker {
            queues.push(&worker.distributor_control_work_queue);
        }
        queues
    }

    /// Fail when a configured role is missing its work or error queue
    pub fn validate_required_queues(&self) -> BusResult<()> {
        if let Some(inbox) = &self.inbox {
            require(&inbox.queues.work_queue, "Inbox.WorkQueue")?;
            require(&inbox.queues.error_queue, "Inbox.ErrorQueue")?;
        }
        if let Some(outbox) = &self.outbox {
            require(&outbox.work_queue, "Outbox.WorkQueue")?;
            require(&outbox.error_queue, "Outbox.ErrorQueue")?;
        }
        if let Some(control) = &self.control_inbox {
            require(&control.work_queue, "ControlInbox.WorkQueue")?;
            require(&control.error_queue, "ControlInbox.ErrorQueue")?;
        }
        Ok(())
    }
}

fn require(queue: &Option<QueueHandle>, name: &str) -> BusResult<()> {
    match queue {
        Some(_) => Ok(()),
        None => Err(ServiceBusError::queue_missing(name)),
    }
}

impl fmt::Debug for ServiceBusConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceBusConfiguration")
            .field("inbox", &self.inbox)
            .field("control_inbox", &self.control_inbox)
            .field("outbox", &self.outbox)
            .field("worker", &self.worker)
            .field("compression_algorithm", &self.compression_algorithm)
            .field("encryption_algorithm", &self.encryption_algorithm)
            .field("modules", &self.modules.iter().map(|m| m.name()).collect::<Vec<_>>())
            .field("dequeue_timeout", &self.dequeue_timeout)
            .field("create_queues", &self.create_queues)
            .finish()
    }
}

fn current_principal() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "anonymous".to_string())
}

/// Builder for [`ServiceBusConfiguration`]
///
/// Queue uris are resolved through the queue manager in `build`, so an unknown
/// scheme or malformed uri is reported before the bus is started.
pub struct ServiceBusConfigurationBuilder {
    queue_manager: Arc<QueueManager>,
    settings: BusSettings,
    serializer: Option<Arc<dyn Serializer>>,
    message_handler_factory: Option<Arc<dyn MessageHandlerFactory>>,
    message_route_provider: Option<Arc<dyn MessageRouteProvider>>,
    subscription_manager: Option<Arc<dyn SubscriptionManager>>,
    idempotence_tracker: Option<Arc<dyn IdempotenceTracker>>,
    transaction_scope_factory: Arc<dyn TransactionScopeFactory>,
    compression_algorithms: HashMap<String, Arc<dyn CompressionAlgorithm>>,
    encryption_algorithms: HashMap<String, Arc<dyn EncryptionAlgorithm>>,
    modules: Vec<Arc<dyn Module>>,
    clock: Arc<dyn Clock>,
    principal_identity_name: Option<String>,
}

impl ServiceBusConfigurationBuilder {
    pub fn new() -> Self {
        Self {
            queue_manager: Arc::new(QueueManager::new()),
            settings: BusSettings::default(),
            serializer: None,
            message_handler_factory: None,
            message_route_provider: None,
            subscription_manager: None,
            idempotence_tracker: None,
            transaction_scope_factory: Arc::new(DefaultTransactionScopeFactory),
            compression_algorithms: HashMap::new(),
            encryption_algorithms: HashMap::new(),
            modules: Vec::new(),
            clock: Arc::new(SystemClock),
            principal_identity_name: None,
        }
    }

    /// Take queue roles, routes and options from a settings document
    ///
    /// The JSON serializer is installed unless one was set explicitly.
    pub fn with_settings(mut self, settings: BusSettings) -> Self {
        self.settings = settings;
        if self.serializer.is_none() {
            self.serializer = Some(Arc::new(JsonSerializer));
        }
        self
    }

    pub fn with_queue_manager(mut self, queue_manager: Arc<QueueManager>) -> Self {
        self.queue_manager = queue_manager;
        self
    }

    pub fn with_inbox(mut self, inbox: InboxSettings) -> Self {
        self.settings.inbox = Some(inbox);
        self
    }

    pub fn with_control_inbox(mut self, control_inbox: QueueSettings) -> Self {
        self.settings.control_inbox = Some(control_inbox);
        self
    }

    pub fn with_outbox(mut self, outbox: QueueSettings) -> Self {
        self.settings.outbox = Some(outbox);
        self
    }

    pub fn with_worker(mut self, worker: WorkerSettings) -> Self {
        self.settings.worker = Some(worker);
        self
    }

    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = Some(serializer);
        self
    }

    pub fn with_message_handler_factory(mut self, factory: Arc<dyn MessageHandlerFactory>) -> Self {
        self.message_handler_factory = Some(factory);
        self
    }

    pub fn with_message_route_provider(mut self, provider: Arc<dyn MessageRouteProvider>) -> Self {
        self.message_route_provider = Some(provider);
        self
    }

    pub fn with_subscription_manager(mut self, manager: Arc<dyn SubscriptionManager>) -> Self {
        self.subscription_manager = Some(manager);
        self
    }

    pub fn with_idempotence_tracker(mut self, tracker: Arc<dyn IdempotenceTracker>) -> Self {
        self.idempotence_tracker = Some(tracker);
        self
    }

    pub fn with_transaction_scope_factory(mut self, factory: Arc<dyn TransactionScopeFactory>) -> Self {
        self.transaction_scope_factory = factory;
        self
    }

    /// Make a compression algorithm available by its name
    pub fn register_compression_algorithm(mut self, algorithm: Arc<dyn CompressionAlgorithm>) -> Self {
        self.compression_algorithms
            .insert(algorithm.name().to_lowercase(), algorithm);
        self
    }

    pub fn register_encryption_algorithm(mut self, algorithm: Arc<dyn EncryptionAlgorithm>) -> Self {
        self.encryption_algorithms
            .insert(algorithm.name().to_lowercase(), algorithm);
        self
    }

    /// Compress outgoing bodies with the named algorithm
    pub fn compress_with(mut self, name: &str) -> Self {
        self.settings.compression_algorithm = Some(name.to_string());
        self
    }

    pub fn encrypt_with(mut self, name: &str) -> Self {
        self.settings.encryption_algorithm = Some(name.to_string());
        self
    }

    pub fn with_module(mut self, module: Arc<dyn Module>) -> Self {
        self.modules.push(module);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.settings.dequeue_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_create_queues(mut self, create_queues: bool) -> Self {
        self.settings.create_queues = create_queues;
        self
    }

    pub fn with_principal_identity_name(mut self, name: impl Into<String>) -> Self {
        self.principal_identity_name = Some(name.into());
        self
    }

    pub fn build(self) -> BusResult<ServiceBusConfiguration> {
        let manager = self.queue_manager;
        let settings = self.settings;

        let inbox = match &settings.inbox {
            Some(inbox) => Some(InboxConfiguration {
                queues: QueueConfiguration::resolve(&manager, &inbox.queues)?,
                deferred_queue: resolve_queue(&manager, inbox.deferred_queue_uri.as_deref())?,
                distribute: inbox.distribute,
                distributor_workers: inbox.distributor_workers.clone(),
                deferred_sweep_pause: Duration::from_millis(inbox.deferred_sweep_pause_ms),
            }),
            None => None,
        };
        let control_inbox = match &settings.control_inbox {
            Some(control) => Some(QueueConfiguration::resolve(&manager, control)?),
            None => None,
        };
        let outbox = match &settings.outbox {
            Some(outbox) => Some(QueueConfiguration::resolve(&manager, outbox)?),
            None => None,
        };
        let worker = match &settings.worker {
            Some(worker) => {
                let distributor_control_work_queue =
                    resolve_queue(&manager, Some(worker.distributor_control_work_queue_uri.as_str()))?.ok_or_else(|| {
                        ServiceBusError::InvalidConfiguration {
                            field: "worker.distributor_control_work_queue_uri".to_string(),
                            message: "must name the distributor's control inbox".to_string(),
                        }
                    })?;
                if worker.thread_available_notification_interval_seconds == 0 {
                    return Err(ServiceBusError::InvalidConfiguration {
                        field: "worker.thread_available_notification_interval_seconds".to_string(),
                        message: "must be at least one second".to_string(),
                    });
                }
                Some(WorkerConfiguration {
                    distributor_control_work_queue_uri: worker.distributor_control_work_queue_uri.clone(),
                    distributor_control_work_queue,
                    thread_available_notification_interval: Duration::from_secs(
                        worker.thread_available_notification_interval_seconds,
                    ),
                })
            }
            None => None,
        };

        let message_route_provider: Arc<dyn MessageRouteProvider> = match self.message_route_provider {
            Some(provider) => provider,
            None => Arc::new(DefaultMessageRouteProvider::from_settings(&settings.message_routes)?),
        };

        Ok(ServiceBusConfiguration {
            queue_manager: manager,
            inbox,
            control_inbox,
            outbox,
            worker,
            serializer: self.serializer,
            message_handler_factory: self.message_handler_factory,
            message_route_provider,
            subscription_manager: self.subscription_manager,
            idempotence_tracker: self.idempotence_tracker,
            transaction_scope_factory: self.transaction_scope_factory,
            compression_algorithm: settings.compression_algorithm.filter(|n| !n.is_empty()),
            encryption_algorithm: settings.encryption_algorithm.filter(|n| !n.is_empty()),
            compression_algorithms: self.compression_algorithms,
            encryption_algorithms: self.encryption_algorithms,
            modules: self.modules,
            clock: self.clock,
            dequeue_timeout: Duration::from_millis(settings.dequeue_timeout_ms),
            create_queues: settings.create_queues,
            principal_identity_name: self.principal_identity_name.unwrap_or_else(current_principal),
        })
    }
}

impl Default for ServiceBusConfigurationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
