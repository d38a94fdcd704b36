//! Synchronisation state of the presence tracker.

use serde::{Deserialize, Serialize};

/// Where the tracker is in its sync lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// No snapshot applied yet.
    Uninitialized,
    /// Applying incremental messages.
    Synced,
    /// Waiting for a fresh snapshot after a sequence gap.
    Resyncing,
}

impl SyncState {
    /// Converts to string.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Synced => "synced",
            Self::Resyncing => "resyncing",
        }
    }
}
