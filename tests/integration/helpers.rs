//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;

use whosonline_core::types::UserId;
use whosonline_core::{AppError, AppResult};
use whosonline_realtime::PRESENCE_CHANNEL;
use whosonline_realtime::PresenceTracker;
use whosonline_realtime::bridge::{MemoryBus, MessageBus};
use whosonline_realtime::message::BusEnvelope;
use whosonline_realtime::presence::{OnlineUser, PresenceSnapshot};
use whosonline_realtime::sync::{RetryPolicy, SnapshotSource};

/// One scripted response, optionally held until `gate` is notified.
#[derive(Debug)]
struct Step {
    gate: Option<Arc<Notify>>,
    result: AppResult<PresenceSnapshot>,
}

/// Snapshot source that replays a fixed script.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then_ok(self, snapshot: PresenceSnapshot) -> Self {
        self.push(None, Ok(snapshot))
    }

    pub fn then_err(self, err: AppError) -> Self {
        self.push(None, Err(err))
    }

    pub fn then_gated(self, gate: Arc<Notify>, snapshot: PresenceSnapshot) -> Self {
        self.push(Some(gate), Ok(snapshot))
    }

    fn push(self, gate: Option<Arc<Notify>>, result: AppResult<PresenceSnapshot>) -> Self {
        self.steps.lock().unwrap().push_back(Step { gate, result });
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for ScriptedSource {
    async fn fetch(&self) -> AppResult<PresenceSnapshot> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(Step { gate, result }) => {
                if let Some(gate) = gate {
                    gate.notified().await;
                }
                result
            }
            None => Err(AppError::external_service("script exhausted")),
        }
    }
}

/// In-memory bus that can be told to refuse subscriptions or receives.
#[derive(Debug, Default)]
pub struct FlakyBus {
    pub inner: MemoryBus,
    failing_subscribes: AtomicUsize,
    failing_receives: AtomicBool,
    receives: AtomicUsize,
}

impl FlakyBus {
    /// Make the next `count` subscribe calls fail.
    pub fn fail_next_subscribes(&self, count: usize) {
        self.failing_subscribes.store(count, Ordering::SeqCst);
    }

    /// Make every receive fail until turned off.
    pub fn fail_receives(&self, failing: bool) {
        self.failing_receives.store(failing, Ordering::SeqCst);
    }

    pub fn receives(&self) -> usize {
        self.receives.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageBus for FlakyBus {
    async fn subscribe(&self, channel: &str, last_id: i64) -> AppResult<()> {
        let refuse = self
            .failing_subscribes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse {
            return Err(AppError::external_service("subscribe refused"));
        }
        self.inner.subscribe(channel, last_id).await
    }

    async fn unsubscribe(&self, channel: &str) -> AppResult<()> {
        self.inner.unsubscribe(channel).await
    }

    async fn recv(&self) -> AppResult<Option<BusEnvelope>> {
        self.receives.fetch_add(1, Ordering::SeqCst);
        if self.failing_receives.load(Ordering::SeqCst) {
            return Err(AppError::external_service("connection reset"));
        }
        self.inner.recv().await
    }
}

/// Tracker wired to a scripted source and an in-memory bus.
pub struct TestTracker {
    pub tracker: Arc<PresenceTracker>,
    pub source: Arc<ScriptedSource>,
    pub bus: Arc<MemoryBus>,
}

impl TestTracker {
    pub fn new(source: ScriptedSource) -> Self {
        Self::with_retry(source, RetryPolicy::none())
    }

    pub fn with_retry(source: ScriptedSource, retry: RetryPolicy) -> Self {
        let source = Arc::new(source);
        let bus = Arc::new(MemoryBus::new());
        let tracker = Arc::new(PresenceTracker::new(source.clone(), bus.clone(), retry));
        Self {
            tracker,
            source,
            bus,
        }
    }

    pub fn deliver(&self, message_id: i64, data: Value) {
        self.bus
            .deliver(BusEnvelope::on_channel(PRESENCE_CHANNEL, message_id, data))
            .unwrap();
    }

    /// Close the bus and drain every queued frame through the tracker.
    pub async fn drain(&self) {
        self.bus.close();
        let (_tx, rx) = tokio::sync::watch::channel(false);
        self.tracker.run(rx).await.unwrap();
    }

    pub async fn ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self
            .tracker
            .online_users()
            .await
            .iter()
            .map(|u| u.id)
            .collect();
        ids.sort();
        ids
    }
}

pub fn snapshot(ids: &[i64], messagebus_id: i64) -> PresenceSnapshot {
    PresenceSnapshot {
        users: ids.iter().map(|&id| OnlineUser::with_id(id)).collect(),
        messagebus_id,
    }
}

pub fn going_online(id: i64) -> Value {
    json!({
        "message_type": "going_online",
        "user": {
            "id": id,
            "username": format!("user{id}"),
            "avatar_template": "/avatar/{size}.png"
        }
    })
}

pub fn going_offline(ids: &[i64]) -> Value {
    json!({ "message_type": "going_offline", "users": ids })
}

pub fn ids(raw: &[i64]) -> Vec<UserId> {
    raw.iter().map(|&id| UserId(id)).collect()
}
