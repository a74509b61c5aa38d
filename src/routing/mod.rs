//! Point-to-point route resolution
//!
//! A [`MessageRouteProvider`](crate::bus::collaborators::MessageRouteProvider)
//! maps a message to candidate endpoint uris. A send needs exactly one of them.

mod provider;
mod resolve;

pub use provider::{DefaultMessageRouteProvider, MessageRoute, RouteSpecification};
pub use resolve::resolve_route;
