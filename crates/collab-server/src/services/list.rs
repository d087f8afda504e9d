//! List lifecycle, sharing and room membership.

use std::sync::Arc;

use chrono::Utc;
use collab_common::{event, list_room, user_room, ListMember, TodoList, UserRole};
use collab_engine::Coordinator;
use collab_store::Store;
use collab_writer::{WriteBehindWorker, WriteOp};
use collab_ws::{RoomRegistry, SocketId};
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use super::{ServiceError, ServiceResult};

const DEFAULT_LIST_NAME: &str = "Untitled List";
const BOOTSTRAP_LIST_NAME: &str = "My TODOs";

pub struct ListService {
    store: Arc<dyn Store>,
    coordinator: Arc<Coordinator>,
    writer: Arc<WriteBehindWorker>,
    rooms: Arc<RoomRegistry>,
}

impl ListService {
    pub fn new(
        store: Arc<dyn Store>,
        coordinator: Arc<Coordinator>,
        writer: Arc<WriteBehindWorker>,
        rooms: Arc<RoomRegistry>,
    ) -> Self {
        Self {
            store,
            coordinator,
            writer,
            rooms,
        }
    }

    /// All list ids the user can access. First login bootstraps a default
    /// list so every user lands on something.
    pub async fn ensure_user_lists(&self, sid: SocketId, user_id: Uuid) -> ServiceResult<Vec<Uuid>> {
        let ids = self.store.accessible_list_ids(user_id).await?;
        if !ids.is_empty() {
            return Ok(ids);
        }

        info!(%user_id, "user has no lists, creating default");
        let list = self
            .create_list(sid, user_id, Some(BOOTSTRAP_LIST_NAME.to_string()))
            .await?;
        Ok(vec![list.id])
    }

    /// Create a list owned by the caller: seed L1+L2, queue the list row
    /// and the owner membership row, and answer with `list_created`.
    pub async fn create_list(
        &self,
        sid: SocketId,
        user_id: Uuid,
        list_name: Option<String>,
    ) -> ServiceResult<TodoList> {
        let now = Utc::now();
        let name = list_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| DEFAULT_LIST_NAME.to_string());
        let list = TodoList {
            id: Uuid::new_v4(),
            name: name.clone(),
            owner_id: user_id,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        let rev = self
            .coordinator
            .init_list(list.id, &list.name, user_id)
            .await?;

        self.writer.enqueue(WriteOp::CreateList(list.clone()));
        self.writer.enqueue(WriteOp::UpsertMember(ListMember {
            list_id: list.id,
            user_id,
            role: UserRole::Owner,
            created_at: now,
        }));

        self.rooms.join(&list_room(list.id), sid);
        self.rooms.emit_to_socket(
            sid,
            event::LIST_CREATED,
            json!({
                "list_id": list.id,
                "list_name": list.name,
                "rev": rev,
                "items": {},
            }),
        );

        info!(%user_id, list_id = %list.id, "created list");
        Ok(list)
    }

    /// Grant `shared_user_id` a role on a list. Only the owner may share
    /// and self-shares are rejected.
    pub async fn share_list(
        &self,
        sid: SocketId,
        owner_user_id: Uuid,
        list_id: Uuid,
        shared_user_id: Uuid,
        role: UserRole,
    ) -> ServiceResult<()> {
        let list = self
            .store
            .get_list(list_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("List {list_id} not found")))?;

        if list.owner_id != owner_user_id {
            return Err(ServiceError::PermissionDenied(
                "Only the list owner can share".to_string(),
            ));
        }
        if shared_user_id == owner_user_id {
            return Err(ServiceError::Invalid(
                "Cannot share a list with yourself".to_string(),
            ));
        }

        self.writer.enqueue(WriteOp::UpsertMember(ListMember {
            list_id,
            user_id: shared_user_id,
            role,
            created_at: Utc::now(),
        }));

        self.rooms.emit_to_socket(
            sid,
            event::LIST_SHARE_SUCCESS,
            json!({
                "list_id": list_id,
                "shared_user_id": shared_user_id,
                "role": role,
                "message": format!("Shared list with user {shared_user_id} as {role}"),
            }),
        );
        self.rooms.emit_to_room(
            &user_room(shared_user_id),
            event::LIST_SHARED_WITH_YOU,
            json!({
                "list_id": list_id,
                "role": role,
                "shared_by": owner_user_id,
                "message": format!("{owner_user_id} shared a list with you."),
            }),
        );

        info!(%list_id, %owner_user_id, %shared_user_id, %role, "granted list membership");
        Ok(())
    }

    /// Current `(rev, list_name, items)` payload for one socket.
    pub async fn snapshot(&self, list_id: Uuid) -> ServiceResult<Value> {
        let state = self.coordinator.load_list(list_id).await?;
        Ok(json!({
            "list_id": list_id,
            "list_name": state.list_name,
            "rev": state.rev,
            "items": state.items,
        }))
    }

    /// Subscribe the socket to the list room and resynchronize it with a
    /// fresh snapshot.
    pub async fn join_list_room(
        &self,
        sid: SocketId,
        user_id: Uuid,
        list_id: Uuid,
    ) -> ServiceResult<()> {
        self.coordinator.load_list(list_id).await?;
        self.rooms.join(&list_room(list_id), sid);
        let snapshot = self.snapshot(list_id).await?;
        self.rooms
            .emit_to_socket(sid, event::LIST_SNAPSHOT, snapshot);
        info!(%user_id, %list_id, "user joined list room");
        Ok(())
    }

    /// Join the personal room and every accessible list room. Lists whose
    /// revision matches the client's last-known one get a lightweight
    /// `list_synced` instead of a snapshot.
    pub async fn join_all_list_rooms(
        &self,
        sid: SocketId,
        user_id: Uuid,
        rev_state: &std::collections::HashMap<Uuid, f64>,
    ) -> ServiceResult<()> {
        self.rooms.join(&user_room(user_id), sid);

        let list_ids = self.ensure_user_lists(sid, user_id).await?;
        for list_id in list_ids {
            let state = match self.coordinator.load_list(list_id).await {
                Ok(state) => state,
                Err(e) => {
                    warn!(%list_id, error = %e, "skipping unloadable list during join");
                    continue;
                }
            };
            self.rooms.join(&list_room(list_id), sid);

            if rev_state.get(&list_id) == Some(&state.rev) {
                self.rooms.emit_to_socket(
                    sid,
                    event::LIST_SYNCED,
                    json!({"list_id": list_id, "rev": state.rev}),
                );
            } else {
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
            }
        }

        info!(%user_id, "user joined personal and list rooms");
        Ok(())
    }
}
