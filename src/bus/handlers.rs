//! Message handlers and the default handler factory

use crate::bus::context::BusContext;
use crate::bus::error::{BoxError, BusResult, ServiceBusError};
use crate::bus::message_context::MessageContext;
use crate::core::sync::{handle_rwlock_read, handle_rwlock_write};
use crate::message::{message_type_name, BusMessage, TransportMessage};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};

/// Typed handler for one business message type
pub trait Handler<M: BusMessage>: Send + Sync {
    fn handle(&self, context: &mut HandlerContext<'_>, message: M) -> Result<(), BoxError>;
}

/// Type-erased handler as seen by the receive pipeline
pub trait MessageHandler: Send + Sync {
    fn handle(&self, context: &mut HandlerContext<'_>, message: serde_json::Value) -> BusResult<()>;
}

/// Resolves the handler for a message type
pub trait MessageHandlerFactory: Send + Sync {
    fn get_handler(&self, message_type: &str) -> Option<Arc<dyn MessageHandler>>;

    fn message_types(&self) -> Vec<String>;
}

/// What a handler can see and do while handling one message
pub struct HandlerContext<'a> {
    bus: &'a Arc<BusContext>,
    message_context: MessageContext,
}

impl<'a> HandlerContext<'a> {
    pub fn new(bus: &'a Arc<BusContext>, message_context: MessageContext) -> Self {
        Self {
            bus,
            message_context,
        }
    }

    /// The envelope being handled
    pub fn transport_message(&self) -> Option<&TransportMessage> {
        self.message_context.transport_message()
    }

    pub fn message_context(&self) -> &MessageContext {
        &self.message_context
    }

    /// Adjust correlation id or headers for subsequent sends
    pub fn message_context_mut(&mut self) -> &mut MessageContext {
        &mut self.message_context
    }

    pub fn bus(&self) -> &Arc<BusContext> {
        self.bus
    }

    pub fn send<M: BusMessage>(&self, message: &M) -> BusResult<TransportMessage> {
        self.bus.send(&self.message_context, message)
    }

    pub fn send_to<M: BusMessage>(&self, uri: &str, message: &M) -> BusResult<TransportMessage> {
        self.bus.send_to(&self.message_context, uri, message)
    }

    pub fn send_local<M: BusMessage>(&self, message: &M) -> BusResult<TransportMessage> {
        self.bus.send_local(&self.message_context, message)
    }

    pub fn send_deferred<M: BusMessage>(
        &self,
        at: DateTime<Utc>,
        message: &M,
        uri: Option<&str>,
    ) -> BusResult<TransportMessage> {
        self.bus.send_deferred(&self.message_context, at, message, uri)
    }

    pub fn send_deferred_local<M: BusMessage>(
        &self,
        at: DateTime<Utc>,
        message: &M,
    ) -> BusResult<TransportMessage> {
        self.bus.send_deferred_local(&self.message_context, at, message)
    }

    pub fn send_reply<M: BusMessage>(&self, message: &M) -> BusResult<TransportMessage> {
        self.bus.send_reply(&self.message_context, message)
    }

    pub fn send_deferred_reply<M: BusMessage>(
        &self,
        at: DateTime<Utc>,
        message: &M,
    ) -> BusResult<TransportMessage> {
        self.bus.send_deferred_reply(&self.message_context, at, message)
    }

    pub fn publish<M: BusMessage>(&self, message: &M) -> BusResult<Vec<String>> {
        self.bus.publish(&self.message_context, message)
    }
}

struct TypedHandler<M, H> {
    handler: H,
    _message: PhantomData<fn() -> M>,
}

impl<M, H> MessageHandler for TypedHandler<M, H>
where
    M: BusMessage,
    H: Handler<M>,
{
    fn handle(&self, context: &mut HandlerContext<'_>, message: serde_json::Value) -> BusResult<()> {
        let message_type = message_type_name::<M>();
        let typed: M = serde_json::from_value(message).map_err(|e| ServiceBusError::Serialization {
            type_name: message_type.to_string(),
            message: e.to_string(),
        })?;
        self.handler
            .handle(context, typed)
            .map_err(|source| ServiceBusError::Handler {
                message_type: message_type.to_string(),
                source,
            })
    }
}

struct FnHandler<F> {
    handler: F,
}

impl<M, F> Handler<M> for FnHandler<F>
where
    M: BusMessage,
    F: Fn(&mut HandlerContext<'_>, M) -> Result<(), BoxError> + Send + Sync,
{
    fn handle(&self, context: &mut HandlerContext<'_>, message: M) -> Result<(), BoxError> {
        (self.handler)(context, message)
    }
}

/// Default [`MessageHandlerFactory`]: one handler per message type
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn MessageHandler>>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `M`, replacing an earlier registration
    pub fn register<M, H>(&self, handler: H) -> BusResult<()>
    where
        M: BusMessage,
        H: Handler<M> + 'static,
    {
        let message_type = message_type_name::<M>();
        let erased: Arc<dyn MessageHandler> = Arc::new(TypedHandler {
            handler,
            _message: PhantomData,
        });
        let mut handlers = handle_rwlock_write(self.handlers.write(), |message| {
            ServiceBusError::Synchronisation { message }
        })?;
        if handlers.insert(message_type.to_string(), erased).is_some() {
            log::warn!("Handler for message type '{}' has been replaced", message_type);
        }
        Ok(())
    }

    /// Register a closure as the handler for `M`
    pub fn register_fn<M, F>(&self, handler: F) -> BusResult<()>
    where
        M: BusMessage,
        F: Fn(&mut HandlerContext<'_>, M) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.register::<M, _>(FnHandler { handler })
    }
}

impl MessageHandlerFactory for HandlerRegistry {
    fn get_handler(&self, message_type: &str) -> Option<Arc<dyn MessageHandler>> {
        handle_rwlock_read(self.handlers.read(), |message| ServiceBusError::Synchronisation {
            message,
        })
        .ok()
        .and_then(|handlers| handlers.get(message_type).cloned())
    }

    fn message_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self
            .handlers
            .read()
            .map(|handlers| handlers.keys().cloned().collect())
            .unwrap_or_default();
        types.sort();
        types
    }
}
