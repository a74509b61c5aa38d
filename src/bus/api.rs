//! Public API for embedding the service bus
//!
//! Host code should import from here rather than from the individual modules.

// Orchestrator and configuration
pub use crate::bus::config::{
    InboxConfiguration, QueueConfiguration, ServiceBusConfiguration, ServiceBusConfigurationBuilder,
    WorkerConfiguration,
};
pub use crate::bus::context::BusContext;
pub use crate::bus::service_bus::ServiceBus;
pub use crate::bus::settings::{
    BusSettings, InboxSettings, MessageRouteSettings, QueueSettings, RouteSpecificationSettings,
    WorkerSettings,
};

// Handlers
pub use crate::bus::handlers::{Handler, HandlerContext, HandlerRegistry, MessageHandler, MessageHandlerFactory};
pub use crate::bus::message_context::MessageContext;

// Collaborators
pub use crate::bus::collaborators::{
    CompressionAlgorithm, DefaultTransactionScope, DefaultTransactionScopeFactory, EncryptionAlgorithm,
    IdempotenceTracker, MemoryIdempotenceTracker, MemorySubscriptionManager, MessageRouteProvider, Module,
    SubscriptionManager, TransactionScope, TransactionScopeFactory,
};
pub use crate::routing::{DefaultMessageRouteProvider, MessageRoute, RouteSpecification};

// Messages
pub use crate::message::{BusMessage, JsonSerializer, Serializer, TransportHeader, TransportMessage, SEND_IMMEDIATELY};
pub use crate::pipelines::{PipelineKind, PipelineOutcome};
pub use crate::worker::{WorkerStarted, WorkerStopped};

// Error handling
pub use crate::bus::error::{BoxError, BusResult, ServiceBusError};
