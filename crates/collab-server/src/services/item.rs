//! Item mutations.
//!
//! The services never emit fan-out events themselves; the Pub/Sub listener
//! broadcasts every committed mutation to the list room on all replicas,
//! including this one. Only per-caller traffic (snapshots, errors) is sent
//! here.

use std::sync::Arc;

use chrono::Utc;
use collab_common::{event, ItemPatch, TodoItem};
use collab_engine::Coordinator;
use collab_writer::{WriteBehindWorker, WriteOp};
use collab_ws::{AddItemPayload, RoomRegistry, SocketId};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ServiceError, ServiceResult};

pub struct ItemService {
    coordinator: Arc<Coordinator>,
    writer: Arc<WriteBehindWorker>,
    rooms: Arc<RoomRegistry>,
}

/// Outcome of checking a client update against the server state.
#[derive(Debug, PartialEq)]
pub(crate) enum UpdateDecision {
    /// Client revision is behind; reject and resynchronize the caller.
    Stale { server_rev: f64 },
    /// Merged record ready for the atomic script.
    Apply(Box<TodoItem>),
}

/// Pure conflict rule: a client update built against `client_rev` is
/// rejected iff the list has moved past it. On acceptance the patch is
/// merged over the current record and `updated_at` restamped.
pub(crate) fn resolve_update(
    current: &TodoItem,
    server_rev: f64,
    client_rev: f64,
    patch: &ItemPatch,
) -> UpdateDecision {
    if client_rev < server_rev {
        return UpdateDecision::Stale { server_rev };
    }
    let mut merged = current.clone();
    merged.apply_patch(patch);
    merged.updated_at = Utc::now();
    UpdateDecision::Apply(Box::new(merged))
}

impl ItemService {
    pub fn new(
        coordinator: Arc<Coordinator>,
        writer: Arc<WriteBehindWorker>,
        rooms: Arc<RoomRegistry>,
    ) -> Self {
        Self {
            coordinator,
            writer,
            rooms,
        }
    }

    /// Create an item with server-generated id and timestamps, commit it
    /// through the atomic script and queue the durable write.
    pub async fn add_item(
        &self,
        user_id: Uuid,
        payload: AddItemPayload,
    ) -> ServiceResult<TodoItem> {
        let list_id = payload.list_id;
        self.coordinator.load_list(list_id).await?;

        let now = Utc::now();
        let item = TodoItem {
            id: Uuid::new_v4(),
            list_id,
            name: payload.name,
            description: payload.description.unwrap_or_default(),
            status: payload.status,
            done: payload.done,
            due_date: payload.due_date,
            media_url: payload.media_url,
            created_at: now,
            updated_at: now,
        };

        self.coordinator.add_item(list_id, &item).await?;
        self.writer.enqueue(WriteOp::AddItem(item.clone()));

        info!(%list_id, item_id = %item.id, %user_id, "added item");
        Ok(item)
    }

    /// Update an item. A stale client revision produces no mutation; the
    /// caller gets a fresh `list_snapshot` plus an `action_error` and the
    /// method returns `None`.
    pub async fn update_item(
        &self,
        sid: SocketId,
        user_id: Uuid,
        list_id: Uuid,
        item_id: Uuid,
        patch: ItemPatch,
        client_rev: f64,
    ) -> ServiceResult<Option<TodoItem>> {
        self.coordinator.load_list(list_id).await?;
        let (current, server_rev) = self.coordinator.get_item(list_id, item_id).await?;
        let current =
            current.ok_or_else(|| ServiceError::NotFound(format!("Item {item_id} not found")))?;

        match resolve_update(&current, server_rev, client_rev, &patch) {
            UpdateDecision::Stale { server_rev } => {
                debug!(
                    %item_id,
                    client_rev,
                    server_rev,
                    "stale client revision, sending snapshot"
                );
                let state = self.coordinator.load_list(list_id).await?;
                self.rooms.emit_to_socket(
                    sid,
                    event::LIST_SNAPSHOT,
                    json!({
                        "list_id": list_id,
                        "list_name": state.list_name,
                        "rev": state.rev,
                        "items": state.items,
                    }),
                );
                self.rooms.emit_to_socket(
                    sid,
                    event::ACTION_ERROR,
                    json!({
                        "message": format!(
                            "Item {item_id} out of sync: client rev {client_rev}, server rev {server_rev}"
                        ),
                    }),
                );
                Ok(None)
            }
            UpdateDecision::Apply(merged) => {
                self.coordinator.update_item(list_id, &merged).await?;
                self.writer.enqueue(WriteOp::UpdateItem {
                    item_id,
                    patch,
                    updated_at: merged.updated_at,
                });
                info!(%list_id, %item_id, %user_id, "updated item");
                Ok(Some(*merged))
            }
        }
    }

    /// Soft-delete an item: null tombstone in L2, key removed from L1,
    /// `is_deleted` in the store.
    pub async fn delete_item(
        &self,
        user_id: Uuid,
        list_id: Uuid,
        item_id: Uuid,
    ) -> ServiceResult<()> {
        self.coordinator.load_list(list_id).await?;
        self.coordinator.delete_item(list_id, item_id).await?;
        self.writer.enqueue(WriteOp::DeleteItem { item_id });

        info!(%list_id, %item_id, %user_id, "deleted item");
        Ok(())
    }
}
