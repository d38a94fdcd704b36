//! Message-bus frame as delivered to subscribers.

use serde::{Deserialize, Serialize};

/// One frame from the message bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEnvelope {
    /// Position in the bus-wide backlog.
    #[serde(default = "default_global_id")]
    pub global_id: i64,
    /// Sequence number within `channel`.
    pub message_id: i64,
    /// Channel the frame was published on.
    pub channel: String,
    /// Untyped payload; see [`super::validator`].
    #[serde(default)]
    pub data: serde_json::Value,
}

impl BusEnvelope {
    /// Create an envelope for a channel message.
    pub fn on_channel(channel: &str, message_id: i64, data: serde_json::Value) -> Self {
        Self {
            global_id: default_global_id(),
            channel: channel.to_string(),
            message_id,
            data,
        }
    }
}

fn default_global_id() -> i64 {
    -1
}
