//! Site settings consumed read-only by the presence widget.

use serde::{Deserialize, Serialize};

/// Presence widget settings, as published by the site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceConfig {
    /// Master switch for the feature.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Show the list to everyone, anonymous visitors included.
    #[serde(default)]
    pub display_public: bool,
    /// Minimum trust level a viewer needs when the list is not public.
    #[serde(default)]
    pub min_trust_to_view: u8,
    /// The widget stays hidden until at least this many users are online.
    #[serde(default = "default_min_users")]
    pub min_users_to_display: usize,
    /// Upper bound on rendered avatars.
    #[serde(default = "default_max_avatars")]
    pub max_avatars_to_display: usize,
    /// Switch to the condensed display at this many users. 0 disables it.
    #[serde(default)]
    pub collapse_threshold: usize,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            display_public: false,
            min_trust_to_view: 0,
            min_users_to_display: default_min_users(),
            max_avatars_to_display: default_max_avatars(),
            collapse_threshold: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_min_users() -> usize {
    1
}

fn default_max_avatars() -> usize {
    50
}
