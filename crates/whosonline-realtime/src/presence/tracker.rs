//! Presence tracker: keeps the online registry in sync with the site.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{RwLock, broadcast, watch};

use whosonline_core::types::UserId;
use whosonline_core::AppResult;

use crate::PRESENCE_CHANNEL;
use crate::bridge::MessageBus;
use crate::message::envelope::BusEnvelope;
use crate::message::validator;
use crate::sync::{RetryPolicy, SnapshotSource};

use super::events::{ChangeCause, PresenceChanged};
use super::registry::{ApplyOutcome, PresenceRegistry};
use super::snapshot::PresenceSnapshot;
use super::status::SyncState;
use super::user::OnlineUser;

/// Capacity of the change-notification channel.
const CHANGE_BUFFER: usize = 64;

/// Floor for the pause between failed bus receives or stalled resyncs.
const MIN_BACKOFF: Duration = Duration::from_millis(250);

/// What a resync attempt ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResyncOutcome {
    /// The fetched snapshot replaced the registry.
    Applied {
        /// Symmetric difference of old and new ids.
        changed: Vec<UserId>,
    },
    /// A newer resync started while this one was fetching.
    Superseded,
}

#[derive(Debug)]
struct TrackerState {
    registry: PresenceRegistry,
    sync: SyncState,
}

/// Owns the online registry for one client session.
///
/// One task drives [`PresenceTracker::run`] and is the only writer; any
/// number of readers may query concurrently.
#[derive(Debug)]
pub struct PresenceTracker {
    state: RwLock<TrackerState>,
    generation: AtomicU64,
    resyncs: AtomicU64,
    /// Set while no subscription is held after a resync.
    stalled: AtomicBool,
    source: Arc<dyn SnapshotSource>,
    bus: Arc<dyn MessageBus>,
    retry: RetryPolicy,
    changes: broadcast::Sender<PresenceChanged>,
}

impl PresenceTracker {
    /// Create a tracker. Nothing is fetched or subscribed until
    /// [`bootstrap`](Self::bootstrap) or [`start`](Self::start).
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        bus: Arc<dyn MessageBus>,
        retry: RetryPolicy,
    ) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        Self {
            state: RwLock::new(TrackerState {
                registry: PresenceRegistry::new(),
                sync: SyncState::Uninitialized,
            }),
            generation: AtomicU64::new(0),
            resyncs: AtomicU64::new(0),
            stalled: AtomicBool::new(false),
            source,
            bus,
            retry,
            changes,
        }
    }

    /// Apply the page-load snapshot and subscribe from its position.
    pub async fn bootstrap(&self, snapshot: PresenceSnapshot) -> AppResult<()> {
        let messagebus_id = snapshot.messagebus_id;
        let changed = {
            let mut state = self.state.write().await;
            let changed = state.registry.replace(snapshot);
            state.sync = SyncState::Synced;
            changed
        };

        self.bus.subscribe(PRESENCE_CHANNEL, messagebus_id).await?;
        tracing::info!(
            users = changed.len(),
            messagebus_id,
            "Presence registry bootstrapped"
        );
        self.emit(changed, ChangeCause::Bootstrap);
        Ok(())
    }

    /// Fetch an initial snapshot unless one was already applied.
    pub async fn start(&self) -> AppResult<()> {
        if self.state().await != SyncState::Uninitialized {
            return Ok(());
        }
        let source = &*self.source;
        let snapshot = self
            .retry
            .run("initial presence snapshot", move || source.fetch())
            .await?;
        self.bootstrap(snapshot).await
    }

    /// Handle one frame from the bus.
    pub async fn handle_envelope(&self, envelope: BusEnvelope) -> AppResult<()> {
        if envelope.channel != PRESENCE_CHANNEL {
            tracing::trace!(channel = %envelope.channel, "Ignoring frame on foreign channel");
            return Ok(());
        }

        let sequence = envelope.message_id;
        let message = match validator::decode(&envelope.data) {
            Ok(message) => Some(message),
            Err(e) => {
                tracing::error!(sequence, error = %e, "Ignoring invalid presence message");
                None
            }
        };

        let outcome = {
            let mut state = self.state.write().await;
            match state.sync {
                SyncState::Uninitialized => {
                    tracing::warn!(sequence, "Presence message before initial snapshot");
                    return Ok(());
                }
                SyncState::Resyncing => {
                    tracing::debug!(sequence, "Dropping presence message during resync");
                    return Ok(());
                }
                SyncState::Synced => {}
            }
            match &message {
                Some(message) => state.registry.apply(sequence, message),
                None => state.registry.skip(sequence),
            }
        };

        match outcome {
            ApplyOutcome::Applied { changed } => {
                if let Some(message) = &message {
                    tracing::debug!(
                        sequence,
                        message_type = message.message_type(),
                        changed = changed.len(),
                        "Applied presence message"
                    );
                }
                self.emit(changed, ChangeCause::Push);
                Ok(())
            }
            ApplyOutcome::Gap { expected, received } => {
                tracing::info!(expected = ?expected, received, "Presence sequence gap, resyncing");
                self.resync().await.map(|_| ())
            }
            ApplyOutcome::Uninitialized => Ok(()),
        }
    }

    /// Replace the registry with a freshly fetched snapshot.
    ///
    /// On fetch failure the registry keeps its last good state and delivery
    /// resumes from the last applied sequence, so the next frame re-detects
    /// the gap. If the subscription cannot be restored the tracker stays
    /// `Resyncing` and [`run`](Self::run) retries the resync.
    pub async fn resync(&self) -> AppResult<ResyncOutcome> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let resume_from = {
            let mut state = self.state.write().await;
            state.sync = SyncState::Resyncing;
            state.registry.last_sequence()
        };

        if let Err(e) = self.bus.unsubscribe(PRESENCE_CHANNEL).await {
            tracing::warn!(error = %e, "Failed to unsubscribe before resync");
        }

        let source = &*self.source;
        let fetched = self
            .retry
            .run("presence resync", move || source.fetch())
            .await;

        let (changed, messagebus_id) = {
            let mut state = self.state.write().await;
            if self.generation.load(Ordering::SeqCst) != generation {
                tracing::debug!(generation, "Discarding superseded resync result");
                return Ok(ResyncOutcome::Superseded);
            }

            match fetched {
                Ok(snapshot) => {
                    let messagebus_id = snapshot.messagebus_id;
                    (state.registry.replace(snapshot), messagebus_id)
                }
                Err(e) => {
                    tracing::error!(generation, error = %e, "Presence resync failed");
                    match resume_from {
                        Some(last) => {
                            drop(state);
                            // A failed resubscribe is logged and left to `run`.
                            let _ = self.resume(generation, last).await;
                        }
                        None => state.sync = SyncState::Uninitialized,
                    }
                    return Err(e);
                }
            }
        };

        self.resyncs.fetch_add(1, Ordering::SeqCst);
        tracing::info!(
            generation,
            messagebus_id,
            changed = changed.len(),
            "Presence registry resynced"
        );
        self.emit(changed.clone(), ChangeCause::Resync);

        self.resume(generation, messagebus_id).await?;
        Ok(ResyncOutcome::Applied { changed })
    }

    /// Subscribe after `last_id` and settle the sync state for `generation`.
    async fn resume(&self, generation: u64, last_id: i64) -> AppResult<()> {
        let subscribed = self.bus.subscribe(PRESENCE_CHANNEL, last_id).await;

        let mut state = self.state.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            return subscribed;
        }
        match subscribed {
            Ok(()) => {
                self.stalled.store(false, Ordering::SeqCst);
                state.sync = SyncState::Synced;
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    generation,
                    last_id,
                    error = %e,
                    "Failed to resubscribe to presence channel"
                );
                self.stalled.store(true, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Consume the bus until `shutdown` flips to `true` or the bus closes,
    /// then release the subscription.
    ///
    /// Receive errors and stalled resyncs back off with the retry policy's
    /// schedule, never faster than a fixed floor.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> AppResult<()> {
        tracing::info!("Presence tracker running");
        let mut failures: u32 = 0;

        loop {
            let stopping = *shutdown.borrow();
            if stopping {
                break;
            }

            if self.stalled.load(Ordering::SeqCst) {
                failures = failures.saturating_add(1);
                let delay = self.backoff(failures);
                tracing::warn!(
                    delay_ms = delay.as_millis() as u64,
                    "Presence delivery stalled, resyncing"
                );
                if pause(&mut shutdown, delay).await {
                    break;
                }
                match self.resync().await {
                    Ok(_) => failures = 0,
                    Err(e) => tracing::warn!(error = %e, "Stalled resync failed"),
                }
                continue;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                frame = self.bus.recv() => match frame {
                    Ok(Some(envelope)) => {
                        failures = 0;
                        if let Err(e) = self.handle_envelope(envelope).await {
                            tracing::warn!(error = %e, "Failed to handle presence frame");
                        }
                    }
                    Ok(None) => {
                        tracing::info!("Message bus closed");
                        break;
                    }
                    Err(e) => {
                        failures = failures.saturating_add(1);
                        let delay = self.backoff(failures);
                        tracing::warn!(
                            error = %e,
                            failures,
                            delay_ms = delay.as_millis() as u64,
                            "Message bus receive failed"
                        );
                        if pause(&mut shutdown, delay).await {
                            break;
                        }
                    }
                },
            }
        }

        self.bus.unsubscribe(PRESENCE_CHANNEL).await?;
        tracing::info!("Presence tracker stopped");
        Ok(())
    }

    fn backoff(&self, failures: u32) -> Duration {
        self.retry.delay_after(failures).max(MIN_BACKOFF)
    }

    /// Subscribe to change notifications.
    pub fn subscribe_changes(&self) -> broadcast::Receiver<PresenceChanged> {
        self.changes.subscribe()
    }

    /// Membership test.
    pub async fn is_online(&self, user_id: UserId) -> bool {
        self.state.read().await.registry.is_online(user_id)
    }

    /// Copy of the online users, in arrival order.
    pub async fn online_users(&self) -> Vec<OnlineUser> {
        self.state.read().await.registry.users().to_vec()
    }

    /// Number of online users.
    pub async fn online_count(&self) -> usize {
        self.state.read().await.registry.len()
    }

    /// Last applied sequence number.
    pub async fn last_sequence(&self) -> Option<i64> {
        self.state.read().await.registry.last_sequence()
    }

    /// Current sync state.
    pub async fn state(&self) -> SyncState {
        self.state.read().await.sync
    }

    /// Completed resync cycles this session.
    pub fn resync_count(&self) -> u64 {
        self.resyncs.load(Ordering::SeqCst)
    }

    fn emit(&self, changed: Vec<UserId>, cause: ChangeCause) {
        if changed.is_empty() {
            return;
        }
        // No receivers is fine: nothing is rendered yet.
        let _ = self.changes.send(PresenceChanged::new(changed, cause));
    }
}

/// Sleep for `delay` unless shutdown is requested first. Returns `true`
/// when the caller should stop.
async fn pause(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        _ = tokio::time::sleep(delay) => false,
    }
}
