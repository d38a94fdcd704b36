//! Display model for the online-users avatar list.

use serde::Serialize;

use whosonline_core::config::presence::PresenceConfig;
use whosonline_core::types::UserId;
use whosonline_i18n::Localizer;

use crate::presence::user::OnlineUser;
use crate::presence::visibility;

/// Avatar size requested from the site, in pixels.
pub const AVATAR_SIZE: u32 = 48;

/// One rendered avatar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvatarItem {
    /// User id.
    pub user_id: UserId,
    /// Login name, used as the tooltip.
    pub username: String,
    /// Resolved avatar URL.
    pub avatar_url: String,
    /// Link target.
    pub profile_path: String,
}

/// Everything a view needs to render the list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AvatarListView {
    /// Whether to render the widget at all.
    pub visible: bool,
    /// Condensed display.
    pub collapsed: bool,
    /// Number of users online.
    pub count: usize,
    /// Localized heading.
    pub title: String,
    /// Avatars to render, in arrival order.
    pub avatars: Vec<AvatarItem>,
    /// Users beyond `max_avatars_to_display`.
    pub overflow: usize,
    /// Localized "and N others" label when `overflow > 0`.
    pub overflow_label: Option<String>,
    /// Localized placeholder when nobody is online.
    pub empty_text: Option<String>,
}

impl AvatarListView {
    /// Build the view for `users` as seen by a viewer at `viewer_level`.
    pub fn build(
        users: &[OnlineUser],
        config: &PresenceConfig,
        viewer_level: Option<u8>,
        localizer: &Localizer,
    ) -> Self {
        let count = users.len();
        let visible =
            visibility::is_visible(config, viewer_level) && count >= config.min_users_to_display;

        if !visible {
            return Self::hidden(count);
        }

        let avatars: Vec<AvatarItem> = users
            .iter()
            .take(config.max_avatars_to_display)
            .map(|u| AvatarItem {
                user_id: u.id,
                username: u.username.clone(),
                avatar_url: u.avatar_url(AVATAR_SIZE),
                profile_path: u.profile_path(),
            })
            .collect();
        let overflow = count - avatars.len();

        Self {
            visible: true,
            collapsed: config.collapse_threshold > 0 && count >= config.collapse_threshold,
            count,
            title: localizer.translate_count("whos_online.title", count),
            avatars,
            overflow,
            overflow_label: (overflow > 0)
                .then(|| localizer.translate_count("whos_online.more", overflow)),
            empty_text: (count == 0).then(|| localizer.translate("whos_online.no_users", None)),
        }
    }

    fn hidden(count: usize) -> Self {
        Self {
            visible: false,
            collapsed: false,
            count,
            title: String::new(),
            avatars: Vec::new(),
            overflow: 0,
            overflow_label: None,
            empty_text: None,
        }
    }
}
