//! Explicit "message being handled" context
//!
//! Each receive execution builds its own [`MessageContext`] and hands it to
//! the handler, so reply destinations and inherited correlation/headers never
//! leak between threads or bus instances.

use crate::message::{TransportHeader, TransportMessage};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageContext {
    transport_message: Option<TransportMessage>,
    /// Correlation id stamped on messages sent from this context
    pub outgoing_correlation_id: String,
    /// Headers stamped on messages sent from this context
    pub outgoing_headers: Vec<TransportHeader>,
}

impl MessageContext {
    /// Context for sends that are not caused by a received message
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for sends made while handling `transport_message`
    ///
    /// Outgoing messages inherit its correlation id and headers.
    pub fn handling(transport_message: &TransportMessage) -> Self {
        Self {
            outgoing_correlation_id: transport_message.correlation_id.clone(),
            outgoing_headers: transport_message.headers.clone(),
            transport_message: Some(transport_message.clone()),
        }
    }

    pub fn transport_message(&self) -> Option<&TransportMessage> {
        self.transport_message.as_ref()
    }

    pub fn is_handling_transport_message(&self) -> bool {
        self.transport_message.is_some()
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.outgoing_correlation_id = correlation_id.into();
        self
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.outgoing_headers.push(TransportHeader::new(key, value));
        self
    }
}
