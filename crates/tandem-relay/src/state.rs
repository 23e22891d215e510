//! Shared relay state: rooms and their members.
//!
//! Each room owns a [`broadcast`] channel. Members publish raw frames to
//! it and receive everything except their own frames, so a message never
//! returns to its sender. A room holds at most two members and is removed
//! when the last one leaves.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tandem_types::ConnectionId;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::error::RelayError;

/// Members allowed per room: the two peers of a pair.
pub const ROOM_MEMBERS: usize = 2;

/// A frame published into a room.
#[derive(Debug, Clone)]
struct RoomFrame {
    sender: ConnectionId,
    text: Arc<str>,
}

#[derive(Debug)]
struct Room {
    frames: broadcast::Sender<RoomFrame>,
    members: Vec<ConnectionId>,
}

/// Shared state for the Axum application.
#[derive(Debug)]
pub struct RelayState {
    rooms: Mutex<HashMap<String, Room>>,
    room_capacity: usize,
}

impl RelayState {
    /// Empty state; `room_capacity` is the per-room frame buffer.
    pub fn new(room_capacity: usize) -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
            room_capacity: room_capacity.max(1),
        }
    }

    /// Join `room`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::RoomFull`] when both seats are taken.
    pub fn join(self: &Arc<Self>, room: &str) -> Result<Membership, RelayError> {
        let mut rooms = self.lock();
        let entry = rooms.entry(room.to_owned()).or_insert_with(|| Room {
            frames: broadcast::channel(self.room_capacity).0,
            members: Vec::with_capacity(ROOM_MEMBERS),
        });
        if entry.members.len() >= ROOM_MEMBERS {
            return Err(RelayError::RoomFull {
                room: room.to_owned(),
                capacity: ROOM_MEMBERS,
            });
        }

        let connection = ConnectionId::new();
        entry.members.push(connection);
        let members = entry.members.len();
        let membership = Membership {
            state: Arc::clone(self),
            room: room.to_owned(),
            connection,
            frames: entry.frames.clone(),
            inbox: entry.frames.subscribe(),
        };
        drop(rooms);
        info!(room, %connection, members, "peer joined");
        Ok(membership)
    }

    /// Number of rooms with at least one member.
    pub fn room_count(&self) -> usize {
        self.lock().len()
    }

    /// Number of members in `room`.
    pub fn member_count(&self, room: &str) -> usize {
        self.lock().get(room).map_or(0, |r| r.members.len())
    }

    fn leave(&self, room: &str, connection: ConnectionId) {
        let mut rooms = self.lock();
        let Some(entry) = rooms.get_mut(room) else {
            return;
        };
        entry.members.retain(|member| *member != connection);
        let remaining = entry.members.len();
        if remaining == 0 {
            rooms.remove(room);
        }
        drop(rooms);
        info!(room, %connection, remaining, "peer left");
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Room>> {
        self.rooms.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for RelayState {
    fn default() -> Self {
        Self::new(256)
    }
}

/// A connection's seat in a room. Dropping it leaves the room.
#[derive(Debug)]
pub struct Membership {
    state: Arc<RelayState>,
    room: String,
    connection: ConnectionId,
    frames: broadcast::Sender<RoomFrame>,
    inbox: broadcast::Receiver<RoomFrame>,
}

impl Membership {
    /// The room joined.
    pub fn room(&self) -> &str {
        &self.room
    }

    /// This connection's id.
    pub const fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// Forward a frame to the other member(s).
    pub fn publish(&self, text: &str) {
        let frame = RoomFrame {
            sender: self.connection,
            text: Arc::from(text),
        };
        // Only our own receiver exists when the partner is absent.
        if self.frames.send(frame).is_err() {
            debug!(room = %self.room, "no receivers, frame dropped");
        }
    }

    /// The next frame from another member. `None` if the room closed.
    pub async fn recv(&mut self) -> Option<Arc<str>> {
        loop {
            match self.inbox.recv().await {
                Ok(frame) if frame.sender == self.connection => {}
                Ok(frame) => return Some(frame.text),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(room = %self.room, skipped, "member lagged, skipping ahead");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.state.leave(&self.room, self.connection);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_reach_the_partner_but_not_the_sender() {
        let state = Arc::new(RelayState::default());
        let mut a = state.join("pair").unwrap();
        let mut b = state.join("pair").unwrap();

        a.publish("from a");
        b.publish("from b");
        assert_eq!(b.recv().await.as_deref(), Some("from a"));
        assert_eq!(a.recv().await.as_deref(), Some("from b"));
    }

    #[test]
    fn third_member_is_refused() {
        let state = Arc::new(RelayState::default());
        let _a = state.join("pair").unwrap();
        let _b = state.join("pair").unwrap();
        assert_eq!(
            state.join("pair").unwrap_err(),
            RelayError::RoomFull {
                room: String::from("pair"),
                capacity: ROOM_MEMBERS,
            }
        );
        assert!(state.join("other").is_ok());
    }

    #[test]
    fn dropping_membership_frees_the_seat_and_the_room() {
        let state = Arc::new(RelayState::default());
        let a = state.join("pair").unwrap();
        let b = state.join("pair").unwrap();
        assert_ne!(a.connection(), b.connection());
        assert_eq!(state.member_count("pair"), 2);

        drop(a);
        assert_eq!(state.member_count("pair"), 1);
        let _c = state.join("pair").unwrap();

        drop(b);
        assert_eq!(state.room_count(), 1);
    }

    #[test]
    fn empty_room_is_removed() {
        let state = Arc::new(RelayState::default());
        let a = state.join("solo").unwrap();
        assert_eq!(a.room(), "solo");
        assert_eq!(state.room_count(), 1);
        drop(a);
        assert_eq!(state.room_count(), 0);
    }
}
