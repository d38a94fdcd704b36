//! # whosonline-realtime
//!
//! Live presence registry for a site's "who's online" list. Provides:
//!
//! - Typed push messages decoded at the message-bus boundary
//! - A pure registry that applies sequenced messages and detects gaps
//! - The presence tracker service: bootstrap, incremental sync, resync
//! - Message-bus adapters (in-memory and HTTP long-poll)
//! - Snapshot sources with bounded retry
//! - UI bindings: per-item online decoration and the avatar-list model

pub mod binding;
pub mod bridge;
pub mod message;
pub mod presence;
pub mod sync;


pub use bridge::MessageBus;
pub use presence::registry::PresenceRegistry;
pub use presence::tracker::PresenceTracker;
pub use sync::SnapshotSource;

/// Channel the site publishes presence changes on.
pub const PRESENCE_CHANNEL: &str = "/whos-online";
