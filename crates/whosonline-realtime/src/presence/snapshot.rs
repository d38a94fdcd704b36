//! Full listing of online users plus the bus position to resume from.

use std::path::Path;

use serde::{Deserialize, Serialize};

use whosonline_core::AppResult;

use super::user::OnlineUser;

/// Authoritative snapshot, as returned by the snapshot endpoint and
/// embedded in page bootstrap data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    /// Users online at the time of the snapshot.
    #[serde(default)]
    pub users: Vec<OnlineUser>,
    /// Last channel sequence number covered by the snapshot.
    pub messagebus_id: i64,
}

impl PresenceSnapshot {
    /// Parse a snapshot from JSON text.
    pub fn from_json(raw: &str) -> AppResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Read a snapshot from a JSON file.
    pub async fn load(path: impl AsRef<Path>) -> AppResult<Self> {
        let raw = tokio::fs::read_to_string(path.as_ref()).await?;
        Self::from_json(&raw)
    }
}
