//! Event dispatch.
//!
//! One registry maps each client event onto (payload decode, permission
//! check, handler), invoked in that order. Every failure is answered on
//! the caller's socket only, per the error taxonomy in [`ServiceError`].

use collab_common::event;
use collab_ws::{
    AddItemPayload, ClientEnvelope, CreateListPayload, DeleteItemPayload, JoinListPayload,
    JoinPayload, RoomRegistry, ShareListPayload, SocketId, UpdateItemPayload,
};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{error, warn};

use crate::services::{ServiceError, ServiceResult};
use crate::state::AppState;

/// Entry point for one inbound frame from an authenticated socket.
pub async fn dispatch(state: &AppState, sid: SocketId, envelope: ClientEnvelope) {
    let Some(user_id) = state.connections.get(sid) else {
        warn!(%sid, "event from unregistered socket");
        state.rooms.emit_to_socket(
            sid,
            event::AUTH_ERROR,
            json!({"message": "Unauthorized request"}),
        );
        return;
    };

    let event_name = envelope.event.clone();
    if let Err(err) = route_event(state, sid, user_id, envelope).await {
        report_error(&state.rooms, sid, &event_name, err);
    }
}

async fn route_event(
    state: &AppState,
    sid: SocketId,
    user_id: uuid::Uuid,
    envelope: ClientEnvelope,
) -> ServiceResult<()> {
    match envelope.event.as_str() {
        event::JOIN => {
            let payload: JoinPayload = decode_or_default(&envelope)?;
            state
                .lists
                .join_all_list_rooms(sid, user_id, &payload.rev_state)
                .await
        }

        event::JOIN_LIST => {
            let payload: JoinListPayload = decode(&envelope)?;
            state
                .permissions
                .require_view_permission(payload.list_id, user_id)
                .await?;
            state
                .lists
                .join_list_room(sid, user_id, payload.list_id)
                .await
        }

        event::CREATE_LIST => {
            let payload: CreateListPayload = decode_or_default(&envelope)?;
            state
                .lists
                .create_list(sid, user_id, payload.list_name)
                .await
                .map(|_| ())
        }

        event::ADD_ITEM => {
            let payload: AddItemPayload = decode(&envelope)?;
            payload.validate().map_err(ServiceError::Schema)?;
            state
                .permissions
                .require_edit_permission(payload.list_id, user_id)
                .await?;
            state.items.add_item(user_id, payload).await.map(|_| ())
        }

        event::UPDATE_ITEM => {
            let payload: UpdateItemPayload = decode(&envelope)?;
            payload.validate().map_err(ServiceError::Schema)?;
            state
                .permissions
                .require_edit_permission(payload.list_id, user_id)
                .await?;
            state
                .items
                .update_item(
                    sid,
                    user_id,
                    payload.list_id,
                    payload.item_id,
                    payload.patch,
                    payload.rev,
                )
                .await
                .map(|_| ())
        }

        event::DELETE_ITEM => {
            let payload: DeleteItemPayload = decode(&envelope)?;
            state
                .permissions
                .require_edit_permission(payload.list_id, user_id)
                .await?;
            state
                .items
                .delete_item(user_id, payload.list_id, payload.item_id)
                .await
        }

        event::SHARE_LIST => {
            let payload: ShareListPayload = decode(&envelope)?;
            state
                .lists
                .share_list(
                    sid,
                    user_id,
                    payload.list_id,
                    payload.shared_user_id,
                    payload.role,
                )
                .await
        }

        other => Err(ServiceError::Schema(format!("Unknown event: {other}"))),
    }
}

fn decode<T: DeserializeOwned>(envelope: &ClientEnvelope) -> ServiceResult<T> {
    serde_json::from_value(envelope.data.clone()).map_err(|e| {
        ServiceError::Schema(format!("Invalid data for {}: {e}", envelope.event))
    })
}

fn decode_or_default<T: DeserializeOwned + Default>(envelope: &ClientEnvelope) -> ServiceResult<T> {
    if envelope.data.is_null() {
        Ok(T::default())
    } else {
        decode(envelope)
    }
}

/// Map a failed handler onto the per-socket error event it owes the
/// caller. Internal failures are logged with detail and reported opaquely.
fn report_error(rooms: &RoomRegistry, sid: SocketId, event_name: &str, err: ServiceError) {
    match err {
        ServiceError::Schema(message) => {
            rooms.emit_to_socket(sid, event::ERROR, json!({"message": message}));
        }
        ServiceError::PermissionDenied(message) => {
            warn!(%sid, event_name, %message, "permission denied");
            rooms.emit_to_socket(sid, event::PERMISSION_ERROR, json!({"message": message}));
        }
        ServiceError::NotFound(message) | ServiceError::Invalid(message) => {
            rooms.emit_to_socket(sid, event::ACTION_ERROR, json!({"message": message}));
        }
        ServiceError::Internal(detail) => {
            error!(%sid, event_name, %detail, "handler failed");
            rooms.emit_to_socket(
                sid,
                event::ERROR,
                json!({"message": format!("Failed to handle {event_name}")}),
            );
        }
    }
}
