use crate::bus::collaborators::MessageRouteProvider;
use crate::bus::error::{BusResult, ServiceBusError};

/// Resolve the single recipient for a message
///
/// No candidate is a `RouteNotFound`; more than one is an `AmbiguousRoute`
/// listing every candidate in provider order.
pub fn resolve_route(
    provider: &dyn MessageRouteProvider,
    message_type: &str,
    message: &serde_json::Value,
) -> BusResult<String> {
    let mut uris = provider.get_route_uris(message_type, message);
    match uris.len() {
        0 => Err(ServiceBusError::RouteNotFound {
            message_type: message_type.to_string(),
        }),
        1 => Ok(uris.remove(0)),
        _ => Err(ServiceBusError::AmbiguousRoute {
            message_type: message_type.to_string(),
            uris: uris.join(","),
        }),
    }
}
