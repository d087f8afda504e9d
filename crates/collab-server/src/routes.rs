//! Operational HTTP endpoints: health, metrics and cache administration.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/cache", get(cache_dump))
        .route("/cache/flush", get(cache_flush))
}

/// 200 when Redis answers and both background tasks are alive, 503
/// otherwise.
async fn health(State(state): State<Arc<AppState>>) -> (StatusCode, Json<Value>) {
    let redis_ok = state.coordinator.ping().await.is_ok();
    let worker_running = state.writer.is_running();
    let listener_running = state.listener.is_running();
    let healthy = redis_ok && worker_running && listener_running;

    let body = json!({
        "status": if healthy { "ok" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "redis": redis_ok,
        "worker_running": worker_running,
        "listener_running": listener_running,
    });

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

async fn metrics(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "writer": state.writer.stats(),
        "connections": state.connections.stats(),
        "cache": {"lists": state.l1.len().await},
    }))
}

/// Loaded lists with revision and item count; bodies stay out of the
/// admin surface.
async fn cache_dump(State(state): State<Arc<AppState>>) -> Json<Value> {
    let summary: Value = state
        .l1
        .summary()
        .await
        .into_iter()
        .map(|(list_id, rev, items)| {
            (
                list_id.to_string(),
                json!({"rev": rev, "items": items}),
            )
        })
        .collect::<serde_json::Map<String, Value>>()
        .into();
    Json(summary)
}

async fn cache_flush(State(state): State<Arc<AppState>>) -> Json<Value> {
    let flushed = state.l1.flush_all().await;
    Json(json!({"flushed": flushed}))
}
