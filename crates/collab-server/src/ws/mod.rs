//! WebSocket upgrade and per-socket session loop.
//!
//! The connect handshake carries the bearer token as a query parameter.
//! Every authentication failure answers with an `auth_error` frame and a
//! close; there are no silent rejections. After the handshake the socket
//! gets a write task draining its room channel and a read loop feeding the
//! event dispatcher. Keepalive pings go out every 15s; a socket silent
//! past the 60s cutoff is dropped.

mod dispatch;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use collab_common::event;
use collab_ws::{AuthError, ClientEnvelope, ServerEnvelope, SocketId};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_upgrade))
}

#[derive(Debug, Deserialize)]
struct ConnectQuery {
    token: Option<String>,
}

async fn ws_upgrade(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ConnectQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket, query.token))
}

async fn handle_socket(state: Arc<AppState>, socket: WebSocket, token: Option<String>) {
    let claims = match token {
        None => return reject(socket, AuthError::MissingToken).await,
        Some(token) => match state.validator.validate(&token) {
            Ok(claims) => claims,
            Err(err) => return reject(socket, err).await,
        },
    };

    let sid = SocketId::new();
    let user_id = claims.sub;
    state.connections.add(sid, user_id);
    let mut outbound = state.rooms.register(sid);
    info!(%sid, %user_id, "user connected via WebSocket");

    let (mut sink, mut stream) = socket.split();

    let last_seen = Arc::new(AtomicU64::new(epoch_secs()));
    let ping_interval = state.config.ping_interval;
    let ping_timeout = state.config.ping_timeout;

    let writer_seen = last_seen.clone();
    let write_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ping_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    let Ok(text) = serde_json::to_string(&frame) else { continue };
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let idle = epoch_secs().saturating_sub(writer_seen.load(Ordering::Relaxed));
                    if idle > ping_timeout.as_secs() {
                        debug!(idle, "socket missed keepalive cutoff, closing");
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                    if sink.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    while let Some(msg) = stream.next().await {
        let Ok(msg) = msg else { break };
        last_seen.store(epoch_secs(), Ordering::Relaxed);

        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEnvelope>(&text) {
                Ok(envelope) => dispatch::dispatch(&state, sid, envelope).await,
                Err(e) => {
                    state.rooms.emit_to_socket(
                        sid,
                        event::ERROR,
                        json!({"message": format!("Invalid frame: {e}")}),
                    );
                }
            },
            Message::Close(_) => break,
            // Pings are answered by the transport; both directions count
            // as liveness.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Binary(_) => {
                warn!(%sid, "ignoring binary frame");
            }
        }
    }

    state.connections.remove(sid);
    state.rooms.unregister(sid);
    write_task.abort();
    info!(%sid, %user_id, "socket disconnected");
}

/// Report the authentication failure and close. Each failure path emits
/// `auth_error` with a reason before disconnecting.
async fn reject(mut socket: WebSocket, err: AuthError) {
    warn!(error = %err, "rejecting WebSocket connection");
    let frame = ServerEnvelope::new(event::AUTH_ERROR, json!({"message": err.to_string()}));
    if let Ok(text) = serde_json::to_string(&frame) {
        let _ = socket.send(Message::Text(text)).await;
    }
    let _ = socket.send(Message::Close(None)).await;
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
