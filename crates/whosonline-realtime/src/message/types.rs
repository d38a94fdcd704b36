//! Presence payloads published on the who's-online channel.

use serde::{Deserialize, Serialize};

use whosonline_core::types::UserId;

use crate::presence::user::OnlineUser;

/// A decoded presence payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum PushMessage {
    /// A user started being counted as online.
    GoingOnline {
        /// Profile of the user that came online.
        user: OnlineUser,
    },
    /// One or more users dropped off the list.
    GoingOffline {
        /// Ids of the users that went offline.
        #[serde(alias = "user_ids")]
        users: Vec<UserId>,
    },
}

impl PushMessage {
    /// Wire name of the message type.
    pub fn message_type(&self) -> &'static str {
        match self {
            Self::GoingOnline { .. } => "going_online",
            Self::GoingOffline { .. } => "going_offline",
        }
    }
}
