//! Boundary validation: untyped bus payloads into [`PushMessage`].

use thiserror::Error;

use super::types::PushMessage;

/// Message types this client understands.
pub const KNOWN_MESSAGE_TYPES: &[&str] = &["going_online", "going_offline"];

/// Why a payload could not be turned into a [`PushMessage`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload has no string `message_type`.
    #[error("payload has no message_type")]
    MissingType,
    /// The `message_type` is not one this client handles.
    #[error("unknown message_type '{0}'")]
    UnknownType(String),
    /// The type is known but the body does not match it.
    #[error("malformed {message_type} payload: {source}")]
    Malformed {
        /// Declared message type.
        message_type: String,
        /// Underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Decode a bus payload.
pub fn decode(data: &serde_json::Value) -> Result<PushMessage, DecodeError> {
    let message_type = data
        .get("message_type")
        .and_then(|v| v.as_str())
        .ok_or(DecodeError::MissingType)?;

    if !KNOWN_MESSAGE_TYPES.contains(&message_type) {
        return Err(DecodeError::UnknownType(message_type.to_string()));
    }

    serde_json::from_value(data.clone()).map_err(|source| DecodeError::Malformed {
        message_type: message_type.to_string(),
        source,
    })
}
