//! Whether the viewer may see the online list at all.

use whosonline_core::config::presence::PresenceConfig;

/// Visibility predicate.
///
/// `viewer_level` is `None` for anonymous visitors, who only see the list
/// when it is public.
pub fn can_view(enabled: bool, public: bool, viewer_level: Option<u8>, min_level: u8) -> bool {
    if !enabled {
        return false;
    }
    if public {
        return true;
    }
    matches!(viewer_level, Some(level) if level >= min_level)
}

/// [`can_view`] with the flags taken from site settings.
pub fn is_visible(config: &PresenceConfig, viewer_level: Option<u8>) -> bool {
    can_view(
        config.enabled,
        config.display_public,
        viewer_level,
        config.min_trust_to_view,
    )
}
