use serde::{Serialize, de::DeserializeOwned};
use std::collections::HashMap;

use super::Error;

#[cfg(feature = "bincode")]
pub(crate) fn serialize_value<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Error> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| Error::Encode(e.to_string()))
}

#[cfg(feature = "bincode")]
pub(crate) fn deserialize_value<T: DeserializeOwned>(value: &[u8]) -> Result<T, Error> {
    bincode::serde::decode_from_slice(value, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| Error::Decode(e.to_string()))
}

#[cfg(all(feature = "messagepack", not(feature = "bincode")))]
pub(crate) fn serialize_value<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, Error> {
    rmp_serde::to_vec(value).map_err(|e| Error::Encode(e.to_string()))
}

#[cfg(all(feature = "messagepack", not(feature = "bincode")))]
pub(crate) fn deserialize_value<T: DeserializeOwned>(value: &[u8]) -> Result<T, Error> {
    rmp_serde::from_slice(value).map_err(|e| Error::Decode(e.to_string()))
}

/// The decoded session payload: every field keeps its own serialized bytes,
/// so a field is only deserialized when it is asked for.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionData {
    fields: HashMap<String, Vec<u8>>,
}

impl SessionData {
    /// Decodes a payload read from a store. An empty payload is an empty session.
    pub fn decode(payload: &[u8]) -> Result<Self, Error> {
        if payload.is_empty() {
            return Ok(Self::default());
        }

        let fields = deserialize_value::<HashMap<String, Vec<u8>>>(payload)?;
        Ok(Self { fields })
    }

    /// Encodes the session for storage. An empty session encodes to an empty payload.
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        if self.fields.is_empty() {
            return Ok(Vec::new());
        }

        serialize_value(&self.fields)
    }

    pub fn get<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>, Error> {
        self.fields
            .get(field)
            .map(|bytes| deserialize_value(bytes))
            .transpose()
    }

    /// Sets `field`, returning `true` if the stored bytes changed.
    pub fn insert<T: Serialize + ?Sized>(&mut self, field: &str, value: &T) -> Result<bool, Error> {
        let bytes = serialize_value(value)?;
        if self.fields.get(field) == Some(&bytes) {
            return Ok(false);
        }

        self.fields.insert(field.to_string(), bytes);
        Ok(true)
    }

    pub fn remove(&mut self, field: &str) -> bool {
        self.fields.remove(field).is_some()
    }

    pub fn clear(&mut self) -> bool {
        let had_fields = !self.fields.is_empty();
        self.fields.clear();
        had_fields
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}
