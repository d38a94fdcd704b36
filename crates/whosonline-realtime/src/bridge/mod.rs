//! Transports that deliver message-bus frames to the presence tracker.

pub mod long_poll;
pub mod memory_pubsub;

use async_trait::async_trait;

use whosonline_core::AppResult;

use crate::message::envelope::BusEnvelope;

pub use long_poll::LongPollBus;
pub use memory_pubsub::MemoryBus;

/// A subscribe-by-position message bus.
///
/// Implementations only deliver frames on subscribed channels whose
/// `message_id` is greater than the channel's current position, and move
/// the position forward as frames are delivered.
#[async_trait]
pub trait MessageBus: Send + Sync + std::fmt::Debug {
    /// Start (or restart) delivery on `channel` after `last_id`.
    async fn subscribe(&self, channel: &str, last_id: i64) -> AppResult<()>;

    /// Stop delivery on `channel`. Frames already queued for it are dropped.
    async fn unsubscribe(&self, channel: &str) -> AppResult<()>;

    /// Wait for the next frame. `Ok(None)` means the bus is closed.
    async fn recv(&self) -> AppResult<Option<BusEnvelope>>;
}
