//! JSON wire protocol: event envelopes and the per-event payload shapes.
//!
//! Every frame is `{"event": <name>, "data": {...}}` in both directions.
//! Payloads are decoded into typed structs before any handler runs;
//! decoding or validation failures are answered with an `error` event and
//! the frame is ignored.

use std::collections::HashMap;

use collab_common::{ItemPatch, ItemStatus, UserRole};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub const MAX_NAME_LEN: usize = 255;
pub const MAX_UPDATE_NAME_LEN: usize = 500;
pub const MAX_DESCRIPTION_LEN: usize = 2000;

/// Frame received from a client.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

/// Frame sent to a client.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEnvelope {
    pub event: String,
    pub data: Value,
}

impl ServerEnvelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddItemPayload {
    pub list_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
}

impl AddItemPayload {
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() || self.name.len() > MAX_NAME_LEN {
            return Err(format!("name must be 1-{MAX_NAME_LEN} characters"));
        }
        if let Some(description) = &self.description {
            if description.len() > MAX_DESCRIPTION_LEN {
                return Err(format!(
                    "description must be at most {MAX_DESCRIPTION_LEN} characters"
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateItemPayload {
    pub list_id: Uuid,
    pub item_id: Uuid,
    #[serde(flatten)]
    pub patch: ItemPatch,
    /// The client's last-known list revision; the server rejects updates
    /// built against an older revision.
    pub rev: f64,
}

impl UpdateItemPayload {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(name) = &self.patch.name {
            if name.is_empty() || name.len() > MAX_UPDATE_NAME_LEN {
                return Err(format!("name must be 1-{MAX_UPDATE_NAME_LEN} characters"));
            }
        }
        if let Some(description) = &self.patch.description {
            if description.len() > MAX_DESCRIPTION_LEN {
                return Err(format!(
                    "description must be at most {MAX_DESCRIPTION_LEN} characters"
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteItemPayload {
    pub list_id: Uuid,
    pub item_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct JoinPayload {
    /// Last-known revision per list; lists already at that revision get a
    /// `list_synced` instead of a full snapshot.
    #[serde(default, alias = "revState")]
    pub rev_state: HashMap<Uuid, f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JoinListPayload {
    pub list_id: Uuid,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateListPayload {
    #[serde(default)]
    pub list_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShareListPayload {
    pub list_id: Uuid,
    pub shared_user_id: Uuid,
    pub role: UserRole,
}
