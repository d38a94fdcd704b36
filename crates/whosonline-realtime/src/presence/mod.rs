//! Online-user registry and the service that keeps it in sync.

pub mod events;
pub mod registry;
pub mod snapshot;
pub mod status;
pub mod tracker;
pub mod user;
pub mod visibility;

pub use events::{ChangeCause, PresenceChanged};
pub use registry::{ApplyOutcome, PresenceRegistry};
pub use snapshot::PresenceSnapshot;
pub use status::SyncState;
pub use tracker::PresenceTracker;
pub use user::OnlineUser;
