//! Queue URI parsing and normalisation
//!
//! Queues are addressed as `scheme://host/queue-name?option=value`. Two URIs
//! identify the same queue when their full string forms match ignoring case.

use crate::queue::error::{QueueError, QueueResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

static URI_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?P<scheme>[A-Za-z][A-Za-z0-9+.\-]*)://(?P<host>[^/?#]*)(?P<path>/[^?#]*)?(?:\?(?P<query>[^#]*))?$",
    )
    .expect("queue uri pattern is valid")
});

/// Parsed queue address
#[derive(Debug, Clone)]
pub struct QueueUri {
    original: String,
    normalized: String,
    scheme: String,
    host: String,
    path: String,
    parameters: Vec<(String, String)>,
}

impl QueueUri {
    pub fn parse(uri: &str) -> QueueResult<Self> {
        let trimmed = uri.trim();
        let captures = URI_PATTERN
            .captures(trimmed)
            .ok_or_else(|| QueueError::invalid_uri(uri, "expected 'scheme://host/queue-name'"))?;

        let scheme = captures["scheme"].to_lowercase();
        let host = captures
            .name("host")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let path = captures
            .name("path")
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        let parameters = captures
            .name("query")
            .map(|m| parse_query(m.as_str()))
            .unwrap_or_default();

        Ok(Self {
            original: trimmed.to_string(),
            normalized: trimmed.to_lowercase(),
            scheme,
            host,
            path,
            parameters,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Path including the leading slash, empty when absent
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Queue name: the path without its leading slash
    pub fn queue_name(&self) -> &str {
        self.path.trim_start_matches('/')
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Lower-cased full form used for identity comparisons
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Boolean query parameter; unparsable values fall back to the default
    pub fn bool_parameter(&self, name: &str, default: bool) -> bool {
        match self.parameter(name) {
            Some(value) => value.parse::<bool>().unwrap_or(default),
            None => default,
        }
    }

    /// URI without query string, lower-cased; identifies the physical queue
    pub fn address(&self) -> String {
        format!("{}://{}{}", self.scheme, self.host, self.path).to_lowercase()
    }

    pub fn matches(&self, other: &str) -> bool {
        self.normalized == other.trim().to_lowercase()
    }
}

impl PartialEq for QueueUri {
    fn eq(&self, other: &Self) -> bool {
        self.normalized == other.normalized
    }
}

impl Eq for QueueUri {}

impl fmt::Display for QueueUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// Returns the scheme of a uri-like string, or None for a bare scheme name
pub fn scheme_of(value: &str) -> Option<String> {
    value
        .split_once("://")
        .map(|(scheme, _)| scheme.to_lowercase())
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}
