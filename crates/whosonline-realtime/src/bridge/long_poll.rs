//! HTTP long-poll transport for the site's message bus.
//!
//! Each poll posts the subscribed channels with their positions to
//! `{base}/message-bus/{client_id}/poll` and receives a JSON array of
//! frames. Frames on `/__status` carry the server-side positions of the
//! polled channels and are consumed here rather than delivered.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use whosonline_core::config::client::ClientConfig;
use whosonline_core::types::ClientId;
use whosonline_core::{AppError, AppResult};

use crate::message::envelope::BusEnvelope;
use crate::sync::http::join_url;

use super::MessageBus;

/// Channel the server uses for position updates.
pub const STATUS_CHANNEL: &str = "/__status";

/// Extra time on top of the server's hold time before a poll is abandoned.
const POLL_GRACE: Duration = Duration::from_secs(5);

/// Long-polling message-bus client.
#[derive(Debug)]
pub struct LongPollBus {
    http: reqwest::Client,
    poll_url: String,
    client_id: ClientId,
    poll_timeout: Duration,
    positions: Mutex<HashMap<String, i64>>,
    pending: Mutex<VecDeque<BusEnvelope>>,
    subscribed: Notify,
    seq: AtomicU64,
}

impl LongPollBus {
    /// Create a client with a fresh random client id.
    pub fn new(http: reqwest::Client, config: &ClientConfig) -> Self {
        let client_id = ClientId::new();
        let poll_url = join_url(
            &config.base_url,
            &format!("/message-bus/{}/poll", client_id.as_path_segment()),
        );
        Self {
            http,
            poll_url,
            client_id,
            poll_timeout: config.poll_timeout(),
            positions: Mutex::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
            subscribed: Notify::new(),
            seq: AtomicU64::new(0),
        }
    }

    /// The client id the server sees.
    pub fn client_id(&self) -> ClientId {
        self.client_id
    }

    async fn poll_once(&self) -> AppResult<()> {
        let body = {
            let positions = self.positions.lock().await;
            let mut body = serde_json::Map::with_capacity(positions.len() + 1);
            for (channel, position) in positions.iter() {
                body.insert(channel.clone(), serde_json::Value::from(*position));
            }
            body.insert(
                "__seq".to_string(),
                serde_json::Value::from(self.seq.fetch_add(1, Ordering::Relaxed)),
            );
            body
        };

        let response = self
            .http
            .post(&self.poll_url)
            .header("X-SILENCE-LOGGER", "true")
            .header("Dont-Chunk", "true")
            .json(&body)
            .timeout(self.poll_timeout + POLL_GRACE)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::external_service(format!(
                "Message bus poll returned {status}"
            )));
        }

        let frames: Vec<BusEnvelope> = response.json().await?;
        tracing::trace!(frames = frames.len(), "Message bus poll returned");
        self.absorb(frames).await;
        Ok(())
    }

    /// Apply status frames and queue deliverable ones.
    async fn absorb(&self, frames: Vec<BusEnvelope>) {
        let mut positions = self.positions.lock().await;
        let mut pending = self.pending.lock().await;

        for frame in frames {
            if frame.channel == STATUS_CHANNEL {
                if let Some(status) = frame.data.as_object() {
                    for (channel, id) in status {
                        if let (Some(position), Some(id)) = (positions.get_mut(channel), id.as_i64())
                        {
                            *position = id;
                        }
                    }
                }
                continue;
            }

            match positions.get_mut(&frame.channel) {
                Some(position) if frame.message_id > *position => {
                    *position = frame.message_id;
                    pending.push_back(frame);
                }
                _ => {}
            }
        }
    }
}

#[async_trait]
impl MessageBus for LongPollBus {
    async fn subscribe(&self, channel: &str, last_id: i64) -> AppResult<()> {
        self.positions
            .lock()
            .await
            .insert(channel.to_string(), last_id);
        self.subscribed.notify_one();
        tracing::debug!(channel, last_id, client_id = %self.client_id, "Subscribed");
        Ok(())
    }

    async fn unsubscribe(&self, channel: &str) -> AppResult<()> {
        self.positions.lock().await.remove(channel);
        self.pending.lock().await.retain(|f| f.channel != channel);
        tracing::debug!(channel, "Unsubscribed");
        Ok(())
    }

    async fn recv(&self) -> AppResult<Option<BusEnvelope>> {
        loop {
            if let Some(frame) = self.pending.lock().await.pop_front() {
                return Ok(Some(frame));
            }

            let idle = self.positions.lock().await.is_empty();
            if idle {
                self.subscribed.notified().await;
                continue;
            }

            self.poll_once().await?;
        }
    }
}
