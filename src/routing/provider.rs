//! Type-name based route provider

use crate::bus::collaborators::MessageRouteProvider;
use crate::bus::error::{BusResult, ServiceBusError};
use crate::bus::settings::{MessageRouteSettings, RouteSpecificationSettings};
use regex::Regex;
use std::fmt;

/// Rule deciding whether a message type belongs to a route
#[derive(Clone)]
pub enum RouteSpecification {
    StartsWith(String),
    TypeList(Vec<String>),
    Regex(Regex),
}

impl RouteSpecification {
    pub fn is_satisfied_by(&self, message_type: &str) -> bool {
        match self {
            RouteSpecification::StartsWith(prefix) => message_type.starts_with(prefix.as_str()),
            RouteSpecification::TypeList(types) => types.iter().any(|t| t == message_type),
            RouteSpecification::Regex(pattern) => pattern.is_match(message_type),
        }
    }

    fn from_settings(settings: &RouteSpecificationSettings) -> BusResult<Self> {
        Ok(match settings {
            RouteSpecificationSettings::StartsWith(prefix) => RouteSpecification::StartsWith(prefix.clone()),
            RouteSpecificationSettings::TypeList(types) => RouteSpecification::TypeList(types.clone()),
            RouteSpecificationSettings::Regex(pattern) => {
                let regex = Regex::new(pattern).map_err(|e| ServiceBusError::InvalidConfiguration {
                    field: "message_routes.specifications".to_string(),
                    message: format!("invalid pattern '{}': {}", pattern, e),
                })?;
                RouteSpecification::Regex(regex)
            }
        })
    }
}

impl fmt::Debug for RouteSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteSpecification::StartsWith(prefix) => write!(f, "StartsWith({:?})", prefix),
            RouteSpecification::TypeList(types) => write!(f, "TypeList({:?})", types),
            RouteSpecification::Regex(pattern) => write!(f, "Regex({:?})", pattern.as_str()),
        }
    }
}

/// Endpoint uri with the specifications that select it
#[derive(Debug, Clone)]
pub struct MessageRoute {
    uri: String,
    specifications: Vec<RouteSpecification>,
}

impl MessageRoute {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            specifications: Vec::new(),
        }
    }

    pub fn with_specification(mut self, specification: RouteSpecification) -> Self {
        self.specifications.push(specification);
        self
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// A route matches when any of its specifications is satisfied
    pub fn is_satisfied_by(&self, message_type: &str) -> bool {
        self.specifications.iter().any(|s| s.is_satisfied_by(message_type))
    }
}

/// Ordered list of routes, matched on the full message type name
#[derive(Debug, Clone, Default)]
pub struct DefaultMessageRouteProvider {
    routes: Vec<MessageRoute>,
}

impl DefaultMessageRouteProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &[MessageRouteSettings]) -> BusResult<Self> {
        let mut provider = Self::new();
        for route in settings {
            let mut built = MessageRoute::new(route.uri.clone());
            for specification in &route.specifications {
                built = built.with_specification(RouteSpecification::from_settings(specification)?);
            }
            provider.add_route(built);
        }
        Ok(provider)
    }

    pub fn add_route(&mut self, route: MessageRoute) {
        self.routes.push(route);
    }

    pub fn with_route(mut self, route: MessageRoute) -> Self {
        self.add_route(route);
        self
    }

    pub fn routes(&self) -> &[MessageRoute] {
        &self.routes
    }
}

impl MessageRouteProvider for DefaultMessageRouteProvider {
    fn get_route_uris(&self, message_type: &str, _message: &serde_json::Value) -> Vec<String> {
        let mut uris: Vec<String> = Vec::new();
        for route in self.routes.iter().filter(|r| r.is_satisfied_by(message_type)) {
            if !uris.iter().any(|u| u.eq_ignore_ascii_case(route.uri())) {
                uris.push(route.uri().to_string());
            }
        }
        uris
    }
}
