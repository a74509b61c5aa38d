//! Service bus
//!
//! [`ServiceBus`] is the entry point: build a [`ServiceBusConfiguration`],
//! register handlers, start the bus and send messages. Everything a running
//! instance shares lives in its [`BusContext`].

pub mod api;
pub mod collaborators;
pub mod config;
pub mod context;
pub mod error;
pub mod handlers;
pub mod message_context;
pub mod service_bus;
pub mod settings;

pub use config::{ServiceBusConfiguration, ServiceBusConfigurationBuilder};
pub use context::BusContext;
pub use error::{BoxError, BusResult, ServiceBusError};
pub use handlers::{Handler, HandlerContext, HandlerRegistry, MessageHandler, MessageHandlerFactory};
pub use message_context::MessageContext;
pub use service_bus::ServiceBus;
pub use settings::BusSettings;

#[cfg(test)]
pub(crate) mod tests;
