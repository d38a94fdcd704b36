//! The online-user registry and its message handler.
//!
//! Everything here is synchronous and free of I/O so any event loop can
//! drive it: a callback, a stream, or a channel receiver.

use std::collections::BTreeSet;

use whosonline_core::types::UserId;

use crate::message::types::PushMessage;

use super::snapshot::PresenceSnapshot;
use super::user::OnlineUser;

/// Result of offering a sequenced message to the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The message was contiguous and has been applied.
    Applied {
        /// Users whose online status flipped, ascending.
        changed: Vec<UserId>,
    },
    /// The sequence number was not `last + 1`. Nothing was applied.
    Gap {
        /// The sequence number that would have been contiguous, or `None`
        /// when the last one was `i64::MAX` and nothing can follow it.
        expected: Option<i64>,
        /// The sequence number that arrived.
        received: i64,
    },
    /// No snapshot has been applied yet.
    Uninitialized,
}

/// Users currently online, in arrival order, plus the last applied
/// sequence number.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceRegistry {
    users: Vec<OnlineUser>,
    last_sequence: Option<i64>,
}

impl PresenceRegistry {
    /// An empty registry that has not seen a snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry initialised from a snapshot.
    pub fn from_snapshot(snapshot: PresenceSnapshot) -> Self {
        let mut registry = Self::new();
        registry.replace(snapshot);
        registry
    }

    /// Whether a snapshot has been applied.
    pub fn is_initialized(&self) -> bool {
        self.last_sequence.is_some()
    }

    /// Last applied sequence number.
    pub fn last_sequence(&self) -> Option<i64> {
        self.last_sequence
    }

    /// Users in arrival order.
    pub fn users(&self) -> &[OnlineUser] {
        &self.users
    }

    /// Number of online users.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether nobody is online.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Membership test.
    pub fn is_online(&self, user_id: UserId) -> bool {
        self.users.iter().any(|u| u.id == user_id)
    }

    /// Look up an online user's record.
    pub fn get(&self, user_id: UserId) -> Option<&OnlineUser> {
        self.users.iter().find(|u| u.id == user_id)
    }

    /// Ids of all online users, ascending.
    pub fn ids(&self) -> BTreeSet<UserId> {
        self.users.iter().map(|u| u.id).collect()
    }

    /// Apply a decoded message carrying `sequence`.
    pub fn apply(&mut self, sequence: i64, message: &PushMessage) -> ApplyOutcome {
        if let Err(outcome) = self.advance(sequence) {
            return outcome;
        }

        let changed = match message {
            PushMessage::GoingOnline { user } => self.upsert(user.clone()),
            PushMessage::GoingOffline { users } => self.remove_all(users),
        };

        ApplyOutcome::Applied { changed }
    }

    /// Consume `sequence` without changing membership.
    ///
    /// Used for payloads that failed validation: the bus still delivered
    /// them, so the sequence must move on.
    pub fn skip(&mut self, sequence: i64) -> ApplyOutcome {
        match self.advance(sequence) {
            Ok(()) => ApplyOutcome::Applied {
                changed: Vec::new(),
            },
            Err(outcome) => outcome,
        }
    }

    /// Replace the registry wholesale.
    ///
    /// Returns the symmetric difference of the old and new id sets.
    pub fn replace(&mut self, snapshot: PresenceSnapshot) -> Vec<UserId> {
        let before = self.ids();

        let mut users: Vec<OnlineUser> = Vec::with_capacity(snapshot.users.len());
        for user in snapshot.users {
            match users.iter_mut().find(|u| u.id == user.id) {
                Some(existing) => *existing = user,
                None => users.push(user),
            }
        }
        self.users = users;
        self.last_sequence = Some(snapshot.messagebus_id);

        let after = self.ids();
        before.symmetric_difference(&after).copied().collect()
    }

    fn advance(&mut self, sequence: i64) -> Result<(), ApplyOutcome> {
        let last = self.last_sequence.ok_or(ApplyOutcome::Uninitialized)?;
        let expected = last.checked_add(1);
        if expected != Some(sequence) {
            return Err(ApplyOutcome::Gap {
                expected,
                received: sequence,
            });
        }
        self.last_sequence = Some(sequence);
        Ok(())
    }

    fn upsert(&mut self, user: OnlineUser) -> Vec<UserId> {
        match self.users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => {
                *existing = user;
                Vec::new()
            }
            None => {
                let id = user.id;
                self.users.push(user);
                vec![id]
            }
        }
    }

    fn remove_all(&mut self, ids: &[UserId]) -> Vec<UserId> {
        let targets: BTreeSet<UserId> = ids.iter().copied().collect();
        let mut removed = BTreeSet::new();
        self.users.retain(|u| {
            if targets.contains(&u.id) {
                removed.insert(u.id);
                false
            } else {
                true
            }
        });
        removed.into_iter().collect()
    }
}
