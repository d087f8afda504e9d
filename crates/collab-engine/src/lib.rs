//! Cache coordination for the collaboration engine.
//!
//! Three tiers: a per-replica in-memory mirror ([`StateCache`]), the
//! authoritative Redis hash per list (mutated only through the atomic Lua
//! scripts in [`scripts`]), and the durable store behind the
//! [`collab_store::Store`] trait. The [`Coordinator`] is the single ingress
//! point for loads and mutations; the [`UpdateListener`] bridges the Redis
//! Pub/Sub channel back into L1 and out to WebSocket rooms.

mod coordinator;
mod listener;
pub mod scripts;
mod state;

pub use coordinator::Coordinator;
pub use listener::{apply_to_l1, UpdateListener};
pub use state::StateCache;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("list not found: {0}")]
    ListNotFound(Uuid),

    #[error("item not found: {0}")]
    ItemNotFound(Uuid),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store error: {0}")]
    Store(#[from] collab_store::StoreError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt cache entry for list {list_id}: {detail}")]
    CorruptState { list_id: Uuid, detail: String },
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Sink for mutation fan-out. The WebSocket layer implements this to route
/// Pub/Sub messages into the room named after the list id.
pub trait Fanout: Send + Sync {
    fn deliver(&self, room: &str, event: &str, payload: Value);
}
