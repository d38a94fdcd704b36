//! Where authoritative snapshots come from.

pub mod http;
pub mod retry;

use async_trait::async_trait;

use whosonline_core::AppResult;

use crate::presence::snapshot::PresenceSnapshot;

pub use http::HttpSnapshotSource;
pub use retry::RetryPolicy;

/// Fetches a full snapshot of online users.
#[async_trait]
pub trait SnapshotSource: Send + Sync + std::fmt::Debug {
    /// Fetch the current snapshot.
    async fn fetch(&self) -> AppResult<PresenceSnapshot>;
}
