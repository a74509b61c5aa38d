//! Serializer collaborator
//!
//! Bodies pass through a neutral [`serde_json::Value`] so the serializer can
//! be a trait object chosen at configuration time.

use crate::bus::error::{BoxError, BusResult, ServiceBusError};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Any type the bus can carry as a business message
pub trait BusMessage: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> BusMessage for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Full type name recorded in `TransportMessage::message_type`
pub fn message_type_name<M: ?Sized + 'static>() -> &'static str {
    std::any::type_name::<M>()
}

pub trait Serializer: Send + Sync {
    fn name(&self) -> &str;

    fn serialize(&self, value: &serde_json::Value) -> Result<Vec<u8>, BoxError>;

    fn deserialize(&self, bytes: &[u8]) -> Result<serde_json::Value, BoxError>;
}

impl<'a> dyn Serializer + 'a {
    /// Serialize a typed value through this serializer
    pub fn to_bytes<T: Serialize + ?Sized>(&self, type_name: &str, value: &T) -> BusResult<Vec<u8>> {
        let value = serde_json::to_value(value).map_err(|e| serialization_error(type_name, e))?;
        self.serialize(&value)
            .map_err(|e| serialization_error(type_name, e))
    }

    /// Deserialize bytes into a neutral value
    pub fn to_value(&self, type_name: &str, bytes: &[u8]) -> BusResult<serde_json::Value> {
        self.deserialize(bytes)
            .map_err(|e| serialization_error(type_name, e))
    }

    /// Deserialize bytes into a typed value
    pub fn from_bytes<T: DeserializeOwned>(&self, type_name: &str, bytes: &[u8]) -> BusResult<T> {
        let value = self.to_value(type_name, bytes)?;
        serde_json::from_value(value).map_err(|e| serialization_error(type_name, e))
    }
}

fn serialization_error(type_name: &str, error: impl std::fmt::Display) -> ServiceBusError {
    ServiceBusError::Serialization {
        type_name: type_name.to_string(),
        message: error.to_string(),
    }
}

/// UTF-8 JSON serializer
#[derive(Debug, Default, Clone)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &str {
        "json"
    }

    fn serialize(&self, value: &serde_json::Value) -> Result<Vec<u8>, BoxError> {
        Ok(serde_json::to_vec(value)?)
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<serde_json::Value, BoxError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct RegisterMember {
        name: String,
        age: u32,
    }

    #[test]
    fn test_typed_round_trip_through_trait_object() {
        let serializer: &dyn Serializer = &JsonSerializer;
        let original = RegisterMember {
            name: "ada".to_string(),
            age: 36,
        };

        let bytes = serializer.to_bytes("RegisterMember", &original).unwrap();
        let decoded: RegisterMember = serializer.from_bytes("RegisterMember", &bytes).unwrap();

        assert_eq!(decoded, original);
    }

    #[test]
    fn test_mismatched_shape_is_a_serialization_error() {
        let serializer: &dyn Serializer = &JsonSerializer;
        let bytes = serializer.to_bytes("text", &"just text").unwrap();

        let error = serializer
            .from_bytes::<RegisterMember>("RegisterMember", &bytes)
            .unwrap_err();
        assert!(matches!(
            error,
            ServiceBusError::Serialization { ref type_name, .. } if type_name == "RegisterMember"
        ));
    }

    #[test]
    fn test_message_type_name_is_fully_qualified() {
        let name = message_type_name::<RegisterMember>();
        assert!(name.ends_with("::RegisterMember"));
        assert!(name.contains("message::serializer"));
    }
}
