//! Per-item "online" flag for rendered avatars, posts, and user cards.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, watch};

use whosonline_core::types::UserId;

use crate::presence::events::PresenceChanged;
use crate::presence::tracker::PresenceTracker;

/// Derived `is_online` booleans for the users currently on screen.
#[derive(Debug, Default)]
pub struct OnlineDecoration {
    /// User ID → derived online flag
    flags: DashMap<UserId, bool>,
}

impl OnlineDecoration {
    /// Create an empty decoration set.
    pub fn new() -> Self {
        Self {
            flags: DashMap::new(),
        }
    }

    /// Start decorating `user_id`. Returns its current flag.
    pub async fn track(&self, tracker: &PresenceTracker, user_id: UserId) -> bool {
        let online = tracker.is_online(user_id).await;
        self.flags.insert(user_id, online);
        online
    }

    /// Stop decorating `user_id`.
    pub fn untrack(&self, user_id: UserId) {
        self.flags.remove(&user_id);
    }

    /// Derived flag; untracked users read as offline.
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.flags.get(&user_id).map(|r| *r.value()).unwrap_or(false)
    }

    /// Number of tracked users.
    pub fn tracked_count(&self) -> usize {
        self.flags.len()
    }

    /// Recompute the tracked users named by `event`.
    ///
    /// Returns the ids whose flag flipped, which are the items to re-render.
    pub async fn refresh(&self, tracker: &PresenceTracker, event: &PresenceChanged) -> Vec<UserId> {
        let mut flipped = Vec::new();
        for &user_id in &event.user_ids {
            if !self.flags.contains_key(&user_id) {
                continue;
            }
            let online = tracker.is_online(user_id).await;
            if let Some(mut flag) = self.flags.get_mut(&user_id) {
                if *flag != online {
                    *flag = online;
                    flipped.push(user_id);
                }
            }
        }
        flipped
    }

    /// Recompute every tracked user. Used after missed notifications.
    pub async fn refresh_all(&self, tracker: &PresenceTracker) -> Vec<UserId> {
        let tracked: Vec<UserId> = self.flags.iter().map(|r| *r.key()).collect();
        let mut flipped = Vec::new();
        for user_id in tracked {
            let online = tracker.is_online(user_id).await;
            if let Some(mut flag) = self.flags.get_mut(&user_id) {
                if *flag != online {
                    *flag = online;
                    flipped.push(user_id);
                }
            }
        }
        flipped.sort_unstable();
        flipped
    }
}

/// Keep `decoration` current until `shutdown` flips or its sender is
/// dropped. Each batch of flipped ids is handed to `on_flip`.
pub async fn follow<F>(
    decoration: Arc<OnlineDecoration>,
    tracker: Arc<PresenceTracker>,
    mut shutdown: watch::Receiver<bool>,
    mut on_flip: F,
) where
    F: FnMut(Vec<UserId>) + Send,
{
    let mut changes = tracker.subscribe_changes();
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            event = changes.recv() => {
                let flipped = match event {
                    Ok(event) => decoration.refresh(&tracker, &event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "Decoration lagged, recomputing all");
                        decoration.refresh_all(&tracker).await
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !flipped.is_empty() {
                    on_flip(flipped);
                }
            }
        }
    }
}
