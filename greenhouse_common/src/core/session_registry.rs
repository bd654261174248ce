//! # Session Registry
//!
//! Room membership: which session identifiers are currently subscribed to which
//! user's updates. A session joins on websocket connect and leaves on disconnect.
//! When the last session for a user leaves, the registry reports it to the caller
//! so the caller (the server glue) can stop that user's simulation. The registry
//! itself never calls the scheduler, which keeps the dependency graph acyclic.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use serde_json::json;
use std::sync::Arc;

use crate::core::observer::{Observer, METRIC_CONNECTIONS_ACTIVE};
use crate::core::{SessionId, UserId};

/// Result of removing one session from a user's room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveOutcome {
    /// The session was not a member; nothing changed.
    NotJoined,
    /// The session left but other sessions remain subscribed.
    Remaining,
    /// The session left and the room is now empty. The caller should stop the
    /// user's simulation.
    LastSessionLeft,
}

/// # Session Registry
///
/// Thread-safe membership map. Join/leave for the same user are mutually exclusive;
/// absence of a key means zero subscribers (sets are never stored empty).
pub struct SessionRegistry {
    rooms: Mutex<HashMap<UserId, HashSet<SessionId>>>,
    observer: Arc<dyn Observer>,
}

impl SessionRegistry {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            observer,
        }
    }

    /// Adds `session_id` to the membership set for `user_id`, creating the set if
    /// absent, and bumps the active-connections counter.
    pub fn join(&self, user_id: &str, session_id: &str) {
        let mut rooms = self.rooms.lock().expect("SessionRegistry lock poisoned");
        let room = rooms.entry(user_id.to_string()).or_default();
        if room.insert(session_id.to_string()) {
            self.observer.increment_counter(
                METRIC_CONNECTIONS_ACTIVE,
                json!({ "user_id": user_id }),
                1,
            );
            log::info!("Session '{}' joined room '{}'", session_id, user_id);
        }
    }

    /// Removes `session_id` from the room for `user_id`.
    ///
    /// Returns `LastSessionLeft` when the removal emptied the room; the entry is
    /// dropped from the map so `members_of` goes back to reporting an empty set.
    pub fn leave(&self, user_id: &str, session_id: &str) -> LeaveOutcome {
        let mut rooms = self.rooms.lock().expect("SessionRegistry lock poisoned");
        let Some(room) = rooms.get_mut(user_id) else {
            return LeaveOutcome::NotJoined;
        };
        if !room.remove(session_id) {
            return LeaveOutcome::NotJoined;
        }

        self.observer.increment_counter(
            METRIC_CONNECTIONS_ACTIVE,
            json!({ "user_id": user_id }),
            -1,
        );
        log::info!("Session '{}' left room '{}'", session_id, user_id);

        if room.is_empty() {
            rooms.remove(user_id);
            LeaveOutcome::LastSessionLeft
        } else {
            LeaveOutcome::Remaining
        }
    }

    /// Returns the current membership set for `user_id` (possibly empty). The set
    /// is cloned so delivery targeting never holds the registry lock.
    pub fn members_of(&self, user_id: &str) -> HashSet<SessionId> {
        let rooms = self.rooms.lock().expect("SessionRegistry lock poisoned");
        rooms.get(user_id).cloned().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::testkit::RecordingObserver;

    fn registry() -> (SessionRegistry, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        (SessionRegistry::new(observer.clone()), observer)
    }

    #[test]
    fn join_creates_room_and_counts_connection() {
        let (registry, observer) = registry();
        registry.join("7", "sess-a");

        assert_eq!(registry.members_of("7").len(), 1);
        assert!(registry.members_of("7").contains("sess-a"));
        assert_eq!(observer.counter_sum(METRIC_CONNECTIONS_ACTIVE), 1);
    }

    #[test]
    fn duplicate_join_is_idempotent() {
        let (registry, observer) = registry();
        registry.join("7", "sess-a");
        registry.join("7", "sess-a");

        assert_eq!(registry.members_of("7").len(), 1);
        assert_eq!(observer.counter_sum(METRIC_CONNECTIONS_ACTIVE), 1);
    }

    #[test]
    fn last_leave_is_reported_exactly_once() {
        let (registry, _observer) = registry();
        registry.join("7", "sess-a");
        registry.join("7", "sess-b");

        assert_eq!(registry.leave("7", "sess-a"), LeaveOutcome::Remaining);
        assert_eq!(registry.leave("7", "sess-b"), LeaveOutcome::LastSessionLeft);
        // Room entry is gone; a second leave cannot report last-left again.
        assert_eq!(registry.leave("7", "sess-b"), LeaveOutcome::NotJoined);
        assert!(registry.members_of("7").is_empty());
    }

    #[test]
    fn leave_of_unknown_session_is_a_noop() {
        let (registry, observer) = registry();
        registry.join("7", "sess-a");

        assert_eq!(registry.leave("7", "sess-x"), LeaveOutcome::NotJoined);
        assert_eq!(registry.leave("9", "sess-a"), LeaveOutcome::NotJoined);
        assert_eq!(observer.counter_sum(METRIC_CONNECTIONS_ACTIVE), 1);
    }

    #[test]
    fn rooms_are_independent_per_user() {
        let (registry, _observer) = registry();
        registry.join("7", "sess-a");
        registry.join("8", "sess-b");

        assert_eq!(registry.leave("7", "sess-a"), LeaveOutcome::LastSessionLeft);
        assert_eq!(registry.members_of("8").len(), 1);
    }
}
