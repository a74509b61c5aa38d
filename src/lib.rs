//! relaybus - a queue-agnostic service bus core
//!
//! Envelopes ("transport messages") move between pluggable queue backends
//! through ordered pipelines of observer hook points. The bus provides
//! transactional receive, deferred delivery, point-to-point route resolution
//! and distributor fan-out across worker inboxes.

pub mod bus;
pub mod core;
pub mod message;
pub mod pipeline;
pub mod pipelines;
pub mod queue;
pub mod routing;
pub mod worker;

include!(concat!(env!("OUT_DIR"), "/version.rs"));

/// Parse the envelope format version string from build script into u32
pub fn get_envelope_format_version() -> u32 {
    ENVELOPE_FORMAT_VERSION.parse().unwrap_or(1)
}
