//! Socket event names and the Redis Pub/Sub message format.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::TodoItem;

/// Event names exchanged over the WebSocket connection and the Pub/Sub
/// channel. Kept as string constants so the wire format is greppable.
pub mod event {
    // Incoming events
    pub const JOIN: &str = "join";
    pub const JOIN_LIST: &str = "join_list";
    pub const CREATE_LIST: &str = "create_list";
    pub const ADD_ITEM: &str = "add_item";
    pub const UPDATE_ITEM: &str = "update_item";
    pub const DELETE_ITEM: &str = "delete_item";
    pub const SHARE_LIST: &str = "share_list";

    // Outgoing events
    pub const LIST_SNAPSHOT: &str = "list_snapshot";
    pub const LIST_SYNCED: &str = "list_synced";
    pub const LIST_CREATED: &str = "list_created";
    pub const LIST_SHARE_SUCCESS: &str = "list_share_success";
    pub const LIST_SHARED_WITH_YOU: &str = "list_shared_with_you";

    // Mutation fan-out (also the Pub/Sub `type` tags)
    pub const ITEM_ADDED: &str = "item_added";
    pub const ITEM_UPDATED: &str = "item_updated";
    pub const ITEM_DELETED: &str = "item_deleted";

    // Error events
    pub const ERROR: &str = "error";
    pub const ACTION_ERROR: &str = "action_error";
    pub const PERMISSION_ERROR: &str = "permission_error";
    pub const AUTH_ERROR: &str = "auth_error";
}

/// A mutation notification published on the updates channel by the atomic
/// Redis scripts. The `type` tag doubles as the WebSocket event name when
/// the message is fanned out to the list's room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UpdateMessage {
    ItemAdded {
        list_id: Uuid,
        rev: f64,
        item: TodoItem,
    },
    ItemUpdated {
        list_id: Uuid,
        rev: f64,
        item: TodoItem,
    },
    ItemDeleted {
        list_id: Uuid,
        rev: f64,
        item_id: Uuid,
    },
}

impl UpdateMessage {
    pub fn list_id(&self) -> Uuid {
        match self {
            Self::ItemAdded { list_id, .. }
            | Self::ItemUpdated { list_id, .. }
            | Self::ItemDeleted { list_id, .. } => *list_id,
        }
    }

    pub fn rev(&self) -> f64 {
        match self {
            Self::ItemAdded { rev, .. }
            | Self::ItemUpdated { rev, .. }
            | Self::ItemDeleted { rev, .. } => *rev,
        }
    }

    /// The WebSocket event name this message is delivered under.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ItemAdded { .. } => event::ITEM_ADDED,
            Self::ItemUpdated { .. } => event::ITEM_UPDATED,
            Self::ItemDeleted { .. } => event::ITEM_DELETED,
        }
    }
}
