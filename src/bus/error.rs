//! Service bus error types

use crate::core::error_handling::ContextualError;
use crate::queue::api::QueueError;

/// Boxed error raised by message handlers
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum ServiceBusError {
    #[error("No route could be found for message type '{message_type}'")]
    RouteNotFound { message_type: String },

    #[error("Message type '{message_type}' is routed to more than one endpoint: {uris}")]
    AmbiguousRoute { message_type: String, uris: String },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Required queue '{queue}' has not been configured")]
    QueueConfigurationMissing { queue: String },

    #[error("Invalid worker configuration: {message}")]
    WorkerConfigurationInvalid { message: String },

    #[error("Required dependency '{dependency}' has not been configured")]
    MissingDependency { dependency: String },

    #[error("The service bus instance has already been started")]
    AlreadyStarted,

    #[error("The service bus instance has been stopped and cannot be restarted")]
    Stopped,

    #[error("Cannot reply: no message is currently being handled")]
    ReplyWithoutCurrentMessage,

    #[error("Cannot reply to message '{message_id}': it carries no sender inbox work queue uri")]
    ReplyMissingSenderUri { message_id: String },

    #[error("Cannot send a deferred local message: no inbox has been configured")]
    DeferredLocalWithoutInbox,

    #[error("Could not deserialize transport message: {message}")]
    EnvelopeDeserialization { message: String },

    #[error("Serialization failed for '{type_name}': {message}")]
    Serialization { type_name: String, message: String },

    #[error("No handler has been registered for message type '{message_type}'")]
    HandlerNotFound { message_type: String },

    #[error("Handler for message type '{message_type}' failed: {source}")]
    Handler {
        message_type: String,
        #[source]
        source: BoxError,
    },

    #[error("No {kind} algorithm named '{name}' has been registered")]
    AlgorithmNotFound { kind: String, name: String },

    #[error("{kind} algorithm '{name}' failed: {message}")]
    Algorithm {
        kind: String,
        name: String,
        message: String,
    },

    #[error("Could not load configuration from '{path}': {message}")]
    ConfigurationLoad { path: String, message: String },

    #[error("Invalid configuration value for '{field}': {message}")]
    InvalidConfiguration { field: String, message: String },

    #[error("Could not start processor thread '{name}': {message}")]
    ThreadStart { name: String, message: String },

    #[error("Pipeline '{pipeline}' failed: {message}")]
    Pipeline { pipeline: String, message: String },

    #[error("Internal synchronisation failure: {message}")]
    Synchronisation { message: String },
}

impl ServiceBusError {
    pub fn missing_dependency(dependency: &str) -> Self {
        ServiceBusError::MissingDependency {
            dependency: dependency.to_string(),
        }
    }

    pub fn queue_missing(queue: &str) -> Self {
        ServiceBusError::QueueConfigurationMissing {
            queue: queue.to_string(),
        }
    }

    /// Configuration errors are fatal at start and must stop the node from consuming
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            ServiceBusError::QueueConfigurationMissing { .. }
                | ServiceBusError::WorkerConfigurationInvalid { .. }
                | ServiceBusError::MissingDependency { .. }
                | ServiceBusError::ConfigurationLoad { .. }
                | ServiceBusError::InvalidConfiguration { .. }
                | ServiceBusError::AlgorithmNotFound { .. }
                | ServiceBusError::Queue(QueueError::FactoryNotFound { .. })
                | ServiceBusError::Queue(QueueError::InvalidUri { .. })
        )
    }
}

impl ContextualError for ServiceBusError {
    fn is_user_actionable(&self) -> bool {
        self.is_configuration_error()
            || matches!(
                self,
                ServiceBusError::RouteNotFound { .. }
                    | ServiceBusError::AmbiguousRoute { .. }
                    | ServiceBusError::AlreadyStarted
            )
    }

    fn user_message(&self) -> Option<&str> {
        match self {
            ServiceBusError::QueueConfigurationMissing { queue } => Some(queue),
            ServiceBusError::WorkerConfigurationInvalid { message } => Some(message),
            ServiceBusError::MissingDependency { dependency } => Some(dependency),
            ServiceBusError::ConfigurationLoad { message, .. } => Some(message),
            ServiceBusError::InvalidConfiguration { message, .. } => Some(message),
            ServiceBusError::AlgorithmNotFound { name, .. } => Some(name),
            ServiceBusError::RouteNotFound { message_type } => Some(message_type),
            ServiceBusError::AmbiguousRoute { uris, .. } => Some(uris),
            ServiceBusError::AlreadyStarted => Some("the service bus is already running"),
            ServiceBusError::Queue(error) => error.user_message(),
            _ => None,
        }
    }
}

pub type BusResult<T> = Result<T, ServiceBusError>;
