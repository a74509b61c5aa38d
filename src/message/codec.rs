//! Versioned envelope encoding

use crate::bus::error::{BusResult, ServiceBusError};
use crate::message::serializer::Serializer;
use crate::message::transport::TransportMessage;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct VersionedEnvelope {
    format_version: u32,
    transport_message: TransportMessage,
}

pub fn encode_transport_message(
    serializer: &dyn Serializer,
    transport_message: &TransportMessage,
) -> BusResult<Vec<u8>> {
    let envelope = VersionedEnvelope {
        format_version: crate::get_envelope_format_version(),
        transport_message: transport_message.clone(),
    };
    serializer.to_bytes("TransportMessage", &envelope)
}

/// Decode raw queue bytes into an envelope
///
/// Any failure, including an envelope written by a newer format, is reported
/// as `EnvelopeDeserialization`.
pub fn decode_transport_message(
    serializer: &dyn Serializer,
    bytes: &[u8],
) -> BusResult<TransportMessage> {
    let envelope: VersionedEnvelope = serializer
        .from_bytes("TransportMessage", bytes)
        .map_err(|e| ServiceBusError::EnvelopeDeserialization {
            message: e.to_string(),
        })?;

    let supported = crate::get_envelope_format_version();
    if envelope.format_version > supported {
        return Err(ServiceBusError::EnvelopeDeserialization {
            message: format!(
                "envelope format version {} is newer than the supported version {}",
                envelope.format_version, supported
            ),
        });
    }

    Ok(envelope.transport_message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::serializer::JsonSerializer;
    use crate::message::transport::SEND_IMMEDIATELY;
    use chrono::{Duration, Utc};

    #[test]
    fn test_envelope_survives_encoding() {
        let mut message = TransportMessage::new();
        message.message_type = "app::Ping".to_string();
        message.message = vec![1, 2, 3];
        message.correlation_id = "order-7".to_string();
        message.add_header("tenant", "a");
        message.ignore_till = Utc::now() + Duration::minutes(5);

        let bytes = encode_transport_message(&JsonSerializer, &message).unwrap();
        let decoded = decode_transport_message(&JsonSerializer, &bytes).unwrap();

        assert_eq!(decoded, message);
    }

    #[test]
    fn test_immediate_sentinel_is_preserved() {
        let message = TransportMessage::new();
        let bytes = encode_transport_message(&JsonSerializer, &message).unwrap();

        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("\"ignore_till\":null"));
        assert_eq!(
            decode_transport_message(&JsonSerializer, &bytes).unwrap().ignore_till,
            SEND_IMMEDIATELY
        );
    }

    #[test]
    fn test_garbage_is_an_envelope_error() {
        let error = decode_transport_message(&JsonSerializer, b"not json").unwrap_err();
        assert!(matches!(error, ServiceBusError::EnvelopeDeserialization { .. }));
    }

    #[test]
    fn test_newer_format_version_is_rejected() {
        let message = TransportMessage::new();
        let future = serde_json::json!({
            "format_version": crate::get_envelope_format_version() + 1,
            "transport_message": serde_json::to_value(&message).unwrap(),
        });
        let bytes = serde_json::to_vec(&future).unwrap();

        let error = decode_transport_message(&JsonSerializer, &bytes).unwrap_err();
        assert!(error.to_string().contains("newer"));
    }
}
