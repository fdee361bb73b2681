//! Storage change events carried in subscription payloads

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A storage object change, as announced by a bucket notification.
///
/// Notifications carry the full object resource; only `bucket` and `name`
/// are read; any other field is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub bucket: String,
    pub name: String,
}

/// Why a payload could not be turned into an [`Event`]
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("payload is not a JSON object")]
    NotAnObject,

    #[error("field `{0}` is empty")]
    EmptyField(&'static str),
}

impl Event {
    /// Decode an event from raw message bytes.
    ///
    /// The payload must be a JSON object with non-empty string fields
    /// `bucket` and `name`.
    pub fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        if payload.is_empty() {
            return Err(DecodeError::Empty);
        }

        // Derived struct deserializers also accept sequences, so check the shape first.
        let value: serde_json::Value = serde_json::from_slice(payload)?;
        if !value.is_object() {
            return Err(DecodeError::NotAnObject);
        }

        let event: Event = serde_json::from_value(value)?;
        if event.bucket.is_empty() {
            return Err(DecodeError::EmptyField("bucket"));
        }
        if event.name.is_empty() {
            return Err(DecodeError::EmptyField("name"));
        }

        Ok(event)
    }
}
