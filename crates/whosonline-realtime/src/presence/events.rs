//! Change notifications consumed by UI bindings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use whosonline_core::types::UserId;

/// What caused a membership change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    /// First snapshot of the session.
    Bootstrap,
    /// An incremental push message.
    Push,
    /// A full snapshot after a sequence gap.
    Resync,
}

/// Users whose online status flipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceChanged {
    /// Affected ids, ascending.
    pub user_ids: Vec<UserId>,
    /// Source of the change.
    pub cause: ChangeCause,
    /// When the change was applied locally.
    pub at: DateTime<Utc>,
}

impl PresenceChanged {
    /// Create a notification stamped with the current time.
    pub fn new(mut user_ids: Vec<UserId>, cause: ChangeCause) -> Self {
        user_ids.sort_unstable();
        user_ids.dedup();
        Self {
            user_ids,
            cause,
            at: Utc::now(),
        }
    }

    /// Whether `user_id` is among the affected users.
    pub fn affects(&self, user_id: UserId) -> bool {
        self.user_ids.binary_search(&user_id).is_ok()
    }
}
