//! In-memory message bus for single-process use and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use whosonline_core::{AppError, AppResult};

use crate::message::envelope::BusEnvelope;

use super::MessageBus;

/// In-process bus. Publishers assign per-channel sequence numbers;
/// [`MemoryBus::deliver`] injects raw frames to simulate loss and reordering.
#[derive(Debug)]
pub struct MemoryBus {
    tx: Mutex<Option<mpsc::UnboundedSender<BusEnvelope>>>,
    rx: AsyncMutex<mpsc::UnboundedReceiver<BusEnvelope>>,
    /// Channel → last delivered id. Absent = not subscribed.
    positions: Mutex<HashMap<String, i64>>,
    /// Channel → last published id.
    sequences: Mutex<HashMap<String, i64>>,
}

impl MemoryBus {
    /// Create an open bus.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: AsyncMutex::new(rx),
            positions: Mutex::new(HashMap::new()),
            sequences: Mutex::new(HashMap::new()),
        }
    }

    /// Publish `data` on `channel` with the next sequence number.
    pub fn publish(&self, channel: &str, data: serde_json::Value) -> AppResult<i64> {
        let id = {
            let mut sequences = lock(&self.sequences)?;
            let next = sequences.entry(channel.to_string()).or_insert(0);
            *next += 1;
            *next
        };
        self.deliver(BusEnvelope::on_channel(channel, id, data))?;
        Ok(id)
    }

    /// Queue a frame exactly as given.
    pub fn deliver(&self, envelope: BusEnvelope) -> AppResult<()> {
        {
            let mut sequences = lock(&self.sequences)?;
            let last = sequences.entry(envelope.channel.clone()).or_insert(0);
            *last = (*last).max(envelope.message_id);
        }
        let tx = lock(&self.tx)?;
        match tx.as_ref() {
            Some(tx) => tx
                .send(envelope)
                .map_err(|_| AppError::service_unavailable("Memory bus receiver dropped")),
            None => Err(AppError::service_unavailable("Memory bus is closed")),
        }
    }

    /// Set the next id [`MemoryBus::publish`] will build on.
    pub fn set_sequence(&self, channel: &str, last_id: i64) -> AppResult<()> {
        lock(&self.sequences)?.insert(channel.to_string(), last_id);
        Ok(())
    }

    /// Close the bus. Queued frames are still delivered, then `recv`
    /// returns `None`.
    pub fn close(&self) {
        if let Ok(mut tx) = self.tx.lock() {
            tx.take();
        }
    }

    /// Current position on `channel`, if subscribed.
    pub fn position(&self, channel: &str) -> Option<i64> {
        self.positions
            .lock()
            .ok()
            .and_then(|p| p.get(channel).copied())
    }

    /// Whether `channel` is subscribed.
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.position(channel).is_some()
    }

    fn accept(&self, envelope: &BusEnvelope) -> AppResult<bool> {
        let mut positions = lock(&self.positions)?;
        match positions.get_mut(&envelope.channel) {
            Some(position) if envelope.message_id > *position => {
                *position = envelope.message_id;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBus for MemoryBus {
    async fn subscribe(&self, channel: &str, last_id: i64) -> AppResult<()> {
        lock(&self.positions)?.insert(channel.to_string(), last_id);
        tracing::debug!(channel, last_id, "Subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> AppResult<()> {
        lock(&self.positions)?.remove(channel);
        tracing::debug!(channel, "Unsubscribed");
        Ok(())
    }

    async fn recv(&self) -> AppResult<Option<BusEnvelope>> {
        let mut rx = self.rx.lock().await;
        while let Some(envelope) = rx.recv().await {
            if self.accept(&envelope)? {
                return Ok(Some(envelope));
            }
            tracing::trace!(
                channel = %envelope.channel,
                message_id = envelope.message_id,
                "Dropping frame outside subscription"
            );
        }
        Ok(None)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> AppResult<std::sync::MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| AppError::internal("Memory bus lock poisoned"))
}
