//! WebSocket session layer.
//!
//! Authenticated socket registry, room membership and the JSON event
//! protocol. This crate knows nothing about business logic; the server
//! crate wires its registries into the handlers and the Pub/Sub fan-out.

pub mod auth;
pub mod connection;
pub mod protocol;
pub mod rooms;

pub use auth::{AuthError, Claims, TokenValidator};
pub use connection::{ConnectionManager, ConnectionStats, SocketId};
pub use protocol::{
    AddItemPayload, ClientEnvelope, CreateListPayload, DeleteItemPayload, JoinListPayload,
    JoinPayload, ServerEnvelope, ShareListPayload, UpdateItemPayload,
};
pub use rooms::RoomRegistry;
