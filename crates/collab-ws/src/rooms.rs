//! Room registry: named subscription groups over per-socket channels.
//!
//! Each registered socket owns an unbounded channel drained by its write
//! task. Rooms are plain name → member sets; `list_id` rooms receive
//! mutation fan-out, `user_{id}` rooms receive user-targeted events. The
//! registry is also the [`Fanout`] sink the Pub/Sub listener delivers into.

use std::collections::HashSet;

use collab_engine::Fanout;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::connection::SocketId;
use crate::protocol::ServerEnvelope;

#[derive(Default)]
pub struct RoomRegistry {
    senders: DashMap<SocketId, mpsc::UnboundedSender<ServerEnvelope>>,
    rooms: DashMap<String, HashSet<SocketId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a socket and hand back the receiving end its write task
    /// drains.
    pub fn register(&self, sid: SocketId) -> mpsc::UnboundedReceiver<ServerEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.insert(sid, tx);
        rx
    }

    /// Drop the socket's sender and leave every room it was in.
    pub fn unregister(&self, sid: SocketId) {
        self.senders.remove(&sid);
        self.rooms.retain(|_, members| {
            members.remove(&sid);
            !members.is_empty()
        });
    }

    pub fn join(&self, room: &str, sid: SocketId) {
        debug!(%sid, room, "socket joined room");
        self.rooms.entry(room.to_string()).or_default().insert(sid);
    }

    pub fn leave(&self, room: &str, sid: SocketId) {
        if let Some(mut members) = self.rooms.get_mut(room) {
            members.remove(&sid);
        }
    }

    pub fn room_members(&self, room: &str) -> Vec<SocketId> {
        self.rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn emit_to_socket(&self, sid: SocketId, event: &str, data: Value) {
        if let Some(tx) = self.senders.get(&sid) {
            // A failed send means the write task already went away; the
            // disconnect path will unregister the socket.
            let _ = tx.send(ServerEnvelope::new(event, data));
        }
    }

    pub fn emit_to_room(&self, room: &str, event: &str, data: Value) {
        let members = self.room_members(room);
        trace!(room, event, members = members.len(), "room emit");
        for sid in members {
            self.emit_to_socket(sid, event, data.clone());
        }
    }
}

impl Fanout for RoomRegistry {
    fn deliver(&self, room: &str, event: &str, payload: Value) {
        self.emit_to_room(room, event, payload);
    }
}
