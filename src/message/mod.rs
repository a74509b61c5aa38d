//! Envelope model and (de)serialisation
//!
//! A [`TransportMessage`] wraps a serialised business message with the routing,
//! correlation and scheduling metadata the bus needs to move it between queues.

mod codec;
mod serializer;
mod transport;

pub use codec::{decode_transport_message, encode_transport_message};
pub use serializer::{message_type_name, BusMessage, JsonSerializer, Serializer};
pub use transport::{TransportHeader, TransportMessage, SEND_IMMEDIATELY};
