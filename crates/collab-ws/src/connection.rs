//! Socket-id to user-id pool for authenticated connections.
//!
//! Each replica tracks only its own sockets; there is no cross-replica
//! replication of this table.

use std::collections::HashSet;
use std::fmt;

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Identifier of one WebSocket connection on this replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SocketId(Uuid);

impl SocketId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SocketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStats {
    pub total_connections: usize,
    pub unique_users: usize,
}

#[derive(Default)]
pub struct ConnectionManager {
    pool: DashMap<SocketId, Uuid>,
}

impl ConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, sid: SocketId, user_id: Uuid) {
        debug!(%sid, %user_id, "connection added to pool");
        self.pool.insert(sid, user_id);
    }

    pub fn remove(&self, sid: SocketId) {
        self.pool.remove(&sid);
    }

    pub fn get(&self, sid: SocketId) -> Option<Uuid> {
        self.pool.get(&sid).map(|entry| *entry)
    }

    pub fn stats(&self) -> ConnectionStats {
        let unique_users = self
            .pool
            .iter()
            .map(|entry| *entry.value())
            .collect::<HashSet<_>>()
            .len();
        ConnectionStats {
            total_connections: self.pool.len(),
            unique_users,
        }
    }
}
