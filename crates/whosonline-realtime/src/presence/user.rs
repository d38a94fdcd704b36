//! Online user record.

use serde::{Deserialize, Serialize};

use whosonline_core::types::UserId;

/// A user currently counted as online, with the profile fields the
/// widget renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineUser {
    /// Site-assigned user id.
    pub id: UserId,
    /// Login name.
    #[serde(default)]
    pub username: String,
    /// Display name, when the site exposes one.
    #[serde(default)]
    pub name: Option<String>,
    /// Avatar URL template containing a `{size}` placeholder.
    #[serde(default)]
    pub avatar_template: String,
    /// Profile path, when the payload carries it.
    #[serde(default)]
    pub path: Option<String>,
}

impl OnlineUser {
    /// Record with only an id, as some snapshots carry.
    pub fn with_id(id: impl Into<UserId>) -> Self {
        Self {
            id: id.into(),
            username: String::new(),
            name: None,
            avatar_template: String::new(),
            path: None,
        }
    }

    /// Avatar URL at the given pixel size.
    pub fn avatar_url(&self, size: u32) -> String {
        self.avatar_template.replace("{size}", &size.to_string())
    }

    /// Profile path, derived from the username when not supplied.
    pub fn profile_path(&self) -> String {
        match &self.path {
            Some(path) => path.clone(),
            None => format!("/u/{}", self.username.to_lowercase()),
        }
    }
}
