//! Single ingress point for list loads and mutations.
//!
//! A mutation goes through exactly one atomic script execution, which
//! assigns the revision, rewrites the L2 hash and publishes the event. The
//! coordinator then mirrors the result into L1 optimistically; the Pub/Sub
//! listener will re-apply the same revision when the published message
//! arrives, which the rev-guarded L1 ops absorb.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use collab_common::{state_key, ListState, TodoItem};
use collab_store::Store;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

use crate::scripts::ScriptSet;
use crate::{EngineError, Result, StateCache};

pub struct Coordinator {
    redis: ConnectionManager,
    scripts: ScriptSet,
    l1: Arc<StateCache>,
    store: Arc<dyn Store>,
}

impl Coordinator {
    pub async fn new(
        redis: ConnectionManager,
        l1: Arc<StateCache>,
        store: Arc<dyn Store>,
    ) -> Result<Self> {
        let scripts = ScriptSet::new();
        let mut conn = redis.clone();
        scripts.register(&mut conn).await?;
        Ok(Self {
            redis,
            scripts,
            l1,
            store,
        })
    }

    pub fn l1(&self) -> &Arc<StateCache> {
        &self.l1
    }

    /// Liveness probe used by the health endpoint.
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.redis.clone();
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Return the current state of a list, loading it through the tiers:
    /// L1 hit, else L2 hash, else cold start from the durable store.
    pub async fn load_list(&self, list_id: Uuid) -> Result<ListState> {
        if let Some(state) = self.l1.get(list_id).await {
            return Ok(state);
        }
        self.load_from_redis(list_id).await
    }

    /// Item plus the list's current revision, after ensuring the list is
    /// loaded.
    pub async fn get_item(&self, list_id: Uuid, item_id: Uuid) -> Result<(Option<TodoItem>, f64)> {
        let state = self.load_list(list_id).await?;
        Ok((state.items.get(&item_id).cloned(), state.rev))
    }

    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn add_item(&self, list_id: Uuid, item: &TodoItem) -> Result<f64> {
        let payload = serde_json::to_string(item)?;
        let mut conn = self.redis.clone();
        let reply: String = self
            .scripts
            .add_item
            .key(state_key(list_id))
            .arg(item.id.to_string())
            .arg(payload)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| map_script_error(e, list_id, item.id))?;
        let rev = parse_rev(&reply, list_id)?;

        self.l1.add_item(list_id, rev, item.clone()).await;
        info!(%list_id, rev, "added item");
        Ok(rev)
    }

    #[instrument(skip(self, item), fields(item_id = %item.id))]
    pub async fn update_item(&self, list_id: Uuid, item: &TodoItem) -> Result<f64> {
        let payload = serde_json::to_string(item)?;
        let mut conn = self.redis.clone();
        let reply: String = self
            .scripts
            .update_item
            .key(state_key(list_id))
            .arg(item.id.to_string())
            .arg(payload)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| map_script_error(e, list_id, item.id))?;
        let rev = parse_rev(&reply, list_id)?;

        self.l1.update_item(list_id, rev, item.clone()).await;
        info!(%list_id, rev, "updated item");
        Ok(rev)
    }

    #[instrument(skip(self))]
    pub async fn delete_item(&self, list_id: Uuid, item_id: Uuid) -> Result<f64> {
        let mut conn = self.redis.clone();
        let reply: String = self
            .scripts
            .delete_item
            .key(state_key(list_id))
            .arg(item_id.to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| map_script_error(e, list_id, item_id))?;
        let rev = parse_rev(&reply, list_id)?;

        self.l1.delete_item(list_id, rev, item_id).await;
        info!(%list_id, rev, "deleted item");
        Ok(rev)
    }

    /// Seed the L2 hash and L1 mirror for a newly created list. The
    /// initial revision is the server wall clock; the atomic scripts take
    /// over from the first mutation.
    #[instrument(skip(self, list_name))]
    pub async fn init_list(&self, list_id: Uuid, list_name: &str, owner_id: Uuid) -> Result<f64> {
        let rev = epoch_now();
        let mut conn = self.redis.clone();
        conn.hset_multiple::<_, _, _, ()>(
            state_key(list_id),
            &[
                ("rev", format_rev(rev)),
                ("list_name", list_name.to_string()),
                ("owner_id", owner_id.to_string()),
                ("items", "{}".to_string()),
                ("created_at", format!("{}", rev as i64)),
                ("updated_at", format!("{}", rev as i64)),
            ],
        )
        .await?;

        self.l1
            .set(list_id, ListState::new(list_name, owner_id, rev))
            .await;

        info!(%list_id, rev, "initialized list in cache");
        Ok(rev)
    }

    async fn load_from_redis(&self, list_id: Uuid) -> Result<ListState> {
        let mut conn = self.redis.clone();
        let data: HashMap<String, String> = conn.hgetall(state_key(list_id)).await?;

        if data.is_empty() {
            debug!(%list_id, "L2 miss, falling back to durable store");
            return self.load_from_store(list_id).await;
        }

        let state = decode_hash(list_id, &data)?;
        self.l1.set(list_id, state.clone()).await;
        info!(
            %list_id,
            rev = state.rev,
            items = state.items.len(),
            "loaded list from Redis into L1"
        );
        Ok(state)
    }

    /// Cold start: read the list row and its live items, then populate L2
    /// and L1.
    async fn load_from_store(&self, list_id: Uuid) -> Result<ListState> {
        info!(%list_id, "cold start from durable store");

        let list = self
            .store
            .get_list(list_id)
            .await?
            .ok_or(EngineError::ListNotFound(list_id))?;
        let items = self.store.items_for_list(list_id).await?;

        let rev = epoch_now();
        let items: HashMap<Uuid, TodoItem> =
            items.into_iter().map(|item| (item.id, item)).collect();
        let state = ListState {
            rev,
            list_name: list.name,
            owner_id: list.owner_id,
            items,
        };

        let items_json = serde_json::to_string(&state.items)?;
        let mut conn = self.redis.clone();
        conn.hset_multiple::<_, _, _, ()>(
            state_key(list_id),
            &[
                ("rev", format_rev(rev)),
                ("list_name", state.list_name.clone()),
                ("owner_id", state.owner_id.to_string()),
                ("items", items_json),
            ],
        )
        .await?;

        self.l1.set(list_id, state.clone()).await;
        info!(%list_id, items = state.items.len(), "loaded list from store into cache");
        Ok(state)
    }
}

/// Wall-clock seconds since the epoch, fractional part included.
fn epoch_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// Revisions travel as fixed six-decimal strings to keep microsecond
/// precision through Redis replies.
fn format_rev(rev: f64) -> String {
    format!("{rev:.6}")
}

fn parse_rev(reply: &str, list_id: Uuid) -> Result<f64> {
    reply.parse::<f64>().map_err(|e| EngineError::CorruptState {
        list_id,
        detail: format!("bad revision reply {reply:?}: {e}"),
    })
}

/// The scripts signal missing lists/items through error replies; map them
/// onto typed errors and let everything else surface as a Redis error.
fn map_script_error(err: redis::RedisError, list_id: Uuid, item_id: Uuid) -> EngineError {
    let detail = err.to_string();
    if detail.contains("List not found") {
        EngineError::ListNotFound(list_id)
    } else if detail.contains("Item not found") {
        EngineError::ItemNotFound(item_id)
    } else {
        error!(%list_id, %item_id, error = %detail, "redis script failed");
        EngineError::Redis(err)
    }
}

/// Decode the L2 hash into list state. Soft-deleted items are stored as
/// JSON nulls in the `items` map and dropped here.
pub(crate) fn decode_hash(list_id: Uuid, data: &HashMap<String, String>) -> Result<ListState> {
    let rev = data
        .get("rev")
        .and_then(|raw| raw.parse::<f64>().ok())
        .unwrap_or(0.0);
    let list_name = data.get("list_name").cloned().unwrap_or_default();
    let owner_id = data
        .get("owner_id")
        .and_then(|raw| raw.parse::<Uuid>().ok())
        .ok_or_else(|| EngineError::CorruptState {
            list_id,
            detail: "missing or invalid owner_id".into(),
        })?;

    let raw_items = data.get("items").map(String::as_str).unwrap_or("{}");
    let parsed: HashMap<Uuid, Option<TodoItem>> = serde_json::from_str(raw_items)?;
    let items = parsed
        .into_iter()
        .filter_map(|(id, item)| item.map(|it| (id, it)))
        .collect();

    Ok(ListState {
        rev,
        list_name,
        owner_id,
        items,
    })
}
