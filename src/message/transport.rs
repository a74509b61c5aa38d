//! Transport message (envelope)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// "Deliver now" sentinel used for `ignore_till` and immediate sends
pub const SEND_IMMEDIATELY: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

/// String-keyed header; duplicates are allowed and order is preserved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportHeader {
    pub key: String,
    pub value: String,
}

impl TransportHeader {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Wire-level wrapper around a serialised business message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportMessage {
    message_id: Uuid,
    /// Id of the message being handled when this one was sent
    pub message_received_id: Option<Uuid>,
    pub message_type: String,
    /// Resolution hint for the body type, stable across crate versions
    pub type_hint: String,
    pub message: Vec<u8>,
    pub sender_inbox_work_queue_uri: Option<String>,
    pub recipient_inbox_work_queue_uri: Option<String>,
    pub correlation_id: String,
    pub headers: Vec<TransportHeader>,
    pub send_date: DateTime<Utc>,
    #[serde(with = "immediate_as_none", default = "send_immediately")]
    pub ignore_till: DateTime<Utc>,
    pub encryption_algorithm: String,
    pub compression_algorithm: String,
    pub principal_identity_name: String,
}

impl TransportMessage {
    pub fn new() -> Self {
        Self {
            message_id: Uuid::new_v4(),
            message_received_id: None,
            message_type: String::new(),
            type_hint: String::new(),
            message: Vec::new(),
            sender_inbox_work_queue_uri: None,
            recipient_inbox_work_queue_uri: None,
            correlation_id: String::new(),
            headers: Vec::new(),
            send_date: Utc::now(),
            ignore_till: SEND_IMMEDIATELY,
            encryption_algorithm: String::new(),
            compression_algorithm: String::new(),
            principal_identity_name: String::new(),
        }
    }

    pub fn message_id(&self) -> Uuid {
        self.message_id
    }

    /// True while the message must not be delivered
    pub fn is_ignoring(&self, now: DateTime<Utc>) -> bool {
        self.ignore_till > now
    }

    pub fn has_sender_inbox_work_queue_uri(&self) -> bool {
        self.sender_inbox_work_queue_uri
            .as_deref()
            .is_some_and(|uri| !uri.trim().is_empty())
    }

    pub fn has_recipient_inbox_work_queue_uri(&self) -> bool {
        self.recipient_inbox_work_queue_uri
            .as_deref()
            .is_some_and(|uri| !uri.trim().is_empty())
    }

    pub fn is_compressed(&self) -> bool {
        !self.compression_algorithm.is_empty()
    }

    pub fn is_encrypted(&self) -> bool {
        !self.encryption_algorithm.is_empty()
    }

    /// First header value stored under `key`
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.key == key)
            .map(|h| h.value.as_str())
    }

    pub fn add_header(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.headers.push(TransportHeader::new(key, value));
    }

    /// Append headers whose keys are not present yet
    pub fn merge_headers<'a>(&mut self, headers: impl IntoIterator<Item = &'a TransportHeader>) {
        merge_headers(&mut self.headers, headers);
    }
}

impl Default for TransportMessage {
    fn default() -> Self {
        Self::new()
    }
}

fn send_immediately() -> DateTime<Utc> {
    SEND_IMMEDIATELY
}

/// Stores the "deliver now" sentinel as an absent value on the wire
mod immediate_as_none {
    use super::SEND_IMMEDIATELY;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = (*value != SEND_IMMEDIATELY).then_some(*value);
        wire.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        Ok(Option::<DateTime<Utc>>::deserialize(deserializer)?.unwrap_or(SEND_IMMEDIATELY))
    }
}

pub(crate) fn merge_headers<'a>(
    target: &mut Vec<TransportHeader>,
    headers: impl IntoIterator<Item = &'a TransportHeader>,
) {
    for header in headers {
        if !target.iter().any(|h| h.key == header.key) {
            target.push(header.clone());
        }
    }
}
