//! # Room Delivery Fan-out
//!
//! The outbound side of the simulation service. The core produces readings and
//! publishes them to a *room* (all sessions currently subscribed for one user);
//! this module carries them to the individual websocket session tasks.
//!
//! ## Core Design Principles:
//!
//! 1.  **Zero-Copy Fan-out**: A published frame is wrapped in an `Arc` once and each
//!     session receives a pointer to the same block of memory. A busy user with
//!     several dashboards open costs one allocation per tick, not one per session.
//!
//! 2.  **Fire-and-Forget**: `publish` never waits for a session to drain its queue.
//!     Each session has an unbounded MPSC channel consumed by its own async task;
//!     a slow websocket cannot delay the simulation loop that produced the frame.
//!
//! 3.  **Self-Cleaning**: A failed send means the session's receiver was dropped
//!     (the socket task exited), so the handle is removed in the same pass using
//!     `retain`. Explicit `remove_session` covers orderly disconnects.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::{SessionId, UserId};

/// # Update Frame
///
/// One event as delivered to a session: the event name plus its JSON payload.
/// The `Arc` wrapper around this struct is what enables zero-copy fan-out.
#[derive(Debug, Clone)]
pub struct UpdateFrame {
    /// Event name on the wire (e.g. `update_plant`).
    pub event: String,
    /// The JSON payload attached to the event.
    pub payload: Value,
}

/// # Delivery
///
/// The outbound channel abstraction the simulation core publishes through.
/// Fire-and-forget: no acknowledgement is required or reported.
pub trait Delivery: Send + Sync {
    /// Publishes `payload` under `event` to every session currently attached to
    /// `room` (the room id is the user id).
    fn publish(&self, room: &str, event: &str, payload: Value);
}

/// Internal representation of one attached session.
struct SessionHandle {
    session_id: SessionId,
    sender: mpsc::UnboundedSender<Arc<UpdateFrame>>,
}

/// # Room Dispatcher
///
/// Concrete `Delivery` implementation: a room-keyed map of attached sessions.
/// Registration hands the caller the receiving half of the session's channel; the
/// caller's socket task pumps it until disconnect.
pub struct RoomDispatcher {
    rooms: Mutex<HashMap<UserId, Vec<SessionHandle>>>,
}

impl Default for RoomDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomDispatcher {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Attaches a session to a room and returns the receiver its socket task
    /// should pump. Frames published to the room after this call show up on the
    /// receiver in publish order.
    pub fn add_session(
        &self,
        room: &str,
        session_id: &str,
    ) -> mpsc::UnboundedReceiver<Arc<UpdateFrame>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut rooms = self.rooms.lock().expect("RoomDispatcher lock poisoned");
        rooms.entry(room.to_string()).or_default().push(SessionHandle {
            session_id: session_id.to_string(),
            sender: tx,
        });
        log::info!("Session '{}' attached to room '{}'", session_id, room);
        rx
    }

    /// Detaches a session from a room. Dropping the handle closes the channel, so
    /// a socket task blocked on `recv` observes `None` and exits.
    pub fn remove_session(&self, room: &str, session_id: &str) {
        let mut rooms = self.rooms.lock().expect("RoomDispatcher lock poisoned");
        if let Some(handles) = rooms.get_mut(room) {
            handles.retain(|h| h.session_id != session_id);
            if handles.is_empty() {
                rooms.remove(room);
            }
        }
        log::info!("Session '{}' detached from room '{}'", session_id, room);
    }

    /// Number of sessions currently attached to `room`.
    pub fn session_count(&self, room: &str) -> usize {
        let rooms = self.rooms.lock().expect("RoomDispatcher lock poisoned");
        rooms.get(room).map_or(0, Vec::len)
    }
}

impl Delivery for RoomDispatcher {
    fn publish(&self, room: &str, event: &str, payload: Value) {
        let frame = Arc::new(UpdateFrame {
            event: event.to_string(),
            payload,
        });

        let mut rooms = self.rooms.lock().expect("RoomDispatcher lock poisoned");
        let Some(handles) = rooms.get_mut(room) else {
            return;
        };

        // Fan out and drop dead sessions in the same pass.
        handles.retain(|handle| match handle.sender.send(Arc::clone(&frame)) {
            Ok(()) => true,
            Err(_) => {
                log::info!(
                    "Session '{}' receiver gone. Removing from room '{}'.",
                    handle.session_id,
                    room
                );
                false
            }
        });
        if handles.is_empty() {
            rooms.remove(room);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn publish_reaches_every_session_in_the_room() {
        let dispatcher = RoomDispatcher::new();
        let mut rx_a = dispatcher.add_session("7", "sess-a");
        let mut rx_b = dispatcher.add_session("7", "sess-b");

        dispatcher.publish("7", "update_plant", json!({"plant_id": 1}));

        let frame_a = rx_a.recv().await.expect("frame for sess-a");
        let frame_b = rx_b.recv().await.expect("frame for sess-b");
        assert_eq!(frame_a.event, "update_plant");
        // Both sessions see the same shared frame.
        assert!(Arc::ptr_eq(&frame_a, &frame_b));
    }

    #[tokio::test]
    async fn publish_is_scoped_to_the_room() {
        let dispatcher = RoomDispatcher::new();
        let mut rx_a = dispatcher.add_session("7", "sess-a");
        let mut rx_other = dispatcher.add_session("8", "sess-b");

        dispatcher.publish("7", "update_plant", json!({"plant_id": 1}));

        assert!(rx_a.recv().await.is_some());
        assert!(rx_other.try_recv().is_err());
    }

    #[tokio::test]
    async fn dead_sessions_are_dropped_on_publish() {
        let dispatcher = RoomDispatcher::new();
        let rx = dispatcher.add_session("7", "sess-a");
        drop(rx);

        dispatcher.publish("7", "update_plant", json!({"plant_id": 1}));
        assert_eq!(dispatcher.session_count("7"), 0);
    }

    #[tokio::test]
    async fn remove_session_closes_the_channel() {
        let dispatcher = RoomDispatcher::new();
        let mut rx = dispatcher.add_session("7", "sess-a");
        dispatcher.remove_session("7", "sess-a");

        assert!(rx.recv().await.is_none());
        assert_eq!(dispatcher.session_count("7"), 0);
    }
}
