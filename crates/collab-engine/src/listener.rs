//! Background Pub/Sub listener.
//!
//! Subscribes to the updates channel, applies every mutation message to the
//! local L1 mirror (idempotently, revisions only move forward) and fans the
//! unchanged payload out to the WebSocket room named after the list id. A
//! replica that misses messages self-heals on the next `load_list`, which
//! rereads the authoritative L2 hash.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use collab_common::{list_room, UpdateMessage};
use futures_util::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{Fanout, Result, StateCache};

pub struct UpdateListener {
    token: CancellationToken,
    running: Arc<AtomicBool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl UpdateListener {
    /// Subscribe and spawn the listener task. Returns once the
    /// subscription is established.
    pub async fn start(
        client: redis::Client,
        l1: Arc<StateCache>,
        fanout: Arc<dyn Fanout>,
    ) -> Result<Self> {
        let mut pubsub = client.get_async_pubsub().await?;
        pubsub.subscribe(collab_common::UPDATES_CHANNEL).await?;

        let token = CancellationToken::new();
        let running = Arc::new(AtomicBool::new(true));

        let task_token = token.clone();
        let task_running = running.clone();
        let handle = tokio::spawn(async move {
            info!("pub/sub listener running");
            let mut stream = pubsub.on_message();

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    msg = stream.next() => {
                        let Some(msg) = msg else {
                            error!("pub/sub connection closed");
                            break;
                        };
                        let payload: String = match msg.get_payload() {
                            Ok(payload) => payload,
                            Err(e) => {
                                warn!(error = %e, "undecodable pub/sub payload");
                                continue;
                            }
                        };
                        if let Err(e) = handle_message(&l1, fanout.as_ref(), &payload).await {
                            warn!(error = %e, "failed to handle pub/sub message");
                        }
                    }
                }
            }

            task_running.store(false, Ordering::SeqCst);
            info!("pub/sub listener stopped");
        });

        Ok(Self {
            token,
            running,
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Cooperative stop with a bounded join.
    pub async fn stop(&self) {
        info!("stopping pub/sub listener");
        self.token.cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                warn!("pub/sub listener did not stop within 5s");
            }
        }
    }
}

/// Parse one channel message, mirror it into L1 when the list is loaded on
/// this replica, and forward it verbatim to the list's room.
async fn handle_message(l1: &StateCache, fanout: &dyn Fanout, payload: &str) -> Result<()> {
    let message: UpdateMessage = serde_json::from_str(payload)?;
    let raw: serde_json::Value = serde_json::from_str(payload)?;

    let list_id = message.list_id();
    debug!(event = message.event_name(), %list_id, "received pub/sub event");

    if l1.has(list_id).await {
        apply_to_l1(l1, &message).await;
    }

    fanout.deliver(&list_room(list_id), message.event_name(), raw);
    Ok(())
}

/// Apply a mutation message to the L1 mirror. Safe to call any number of
/// times: items are keyed by id and the cache rejects revisions older than
/// what it holds.
pub async fn apply_to_l1(l1: &StateCache, message: &UpdateMessage) {
    match message {
        UpdateMessage::ItemAdded { list_id, rev, item } => {
            l1.add_item(*list_id, *rev, item.clone()).await;
        }
        UpdateMessage::ItemUpdated { list_id, rev, item } => {
            l1.update_item(*list_id, *rev, item.clone()).await;
        }
        UpdateMessage::ItemDeleted {
            list_id,
            rev,
            item_id,
        } => {
            l1.delete_item(*list_id, *rev, *item_id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use collab_common::{ItemStatus, ListState, TodoItem};
    use parking_lot::Mutex as SyncMutex;
    use uuid::Uuid;

    struct RecordingFanout {
        delivered: SyncMutex<Vec<(String, String)>>,
    }

    impl RecordingFanout {
        fn new() -> Self {
            Self {
                delivered: SyncMutex::new(Vec::new()),
            }
        }
    }

    impl Fanout for RecordingFanout {
        fn deliver(&self, room: &str, event: &str, _payload: serde_json::Value) {
            self.delivered
                .lock()
                .push((room.to_string(), event.to_string()));
        }
    }

    fn item(list_id: Uuid) -> TodoItem {
        let now = Utc::now();
        TodoItem {
            id: Uuid::new_v4(),
            list_id,
            name: "bread".into(),
            description: String::new(),
            status: ItemStatus::NotStarted,
            done: false,
            due_date: None,
            media_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn messages_fan_out_even_when_list_not_loaded() {
        let l1 = StateCache::new();
        let fanout = RecordingFanout::new();
        let list_id = Uuid::new_v4();
        let payload = serde_json::to_string(&UpdateMessage::ItemAdded {
            list_id,
            rev: 2.0,
            item: item(list_id),
        })
        .unwrap();

        handle_message(&l1, &fanout, &payload).await.unwrap();

        assert!(!l1.has(list_id).await);
        let delivered = fanout.delivered.lock();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0], (list_id.to_string(), "item_added".to_string()));
    }

    #[tokio::test]
    async fn loaded_lists_get_the_mutation_applied() {
        let l1 = StateCache::new();
        let fanout = RecordingFanout::new();
        let list_id = Uuid::new_v4();
        l1.set(list_id, ListState::new("l", Uuid::new_v4(), 1.0))
            .await;

        let it = item(list_id);
        let payload = serde_json::to_string(&UpdateMessage::ItemAdded {
            list_id,
            rev: 2.0,
            item: it.clone(),
        })
        .unwrap();

        handle_message(&l1, &fanout, &payload).await.unwrap();

        let state = l1.get(list_id).await.unwrap();
        assert_eq!(state.rev, 2.0);
        assert!(state.items.contains_key(&it.id));
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error_not_a_panic() {
        let l1 = StateCache::new();
        let fanout = RecordingFanout::new();
        assert!(handle_message(&l1, &fanout, "{not json").await.is_err());
        assert!(fanout.delivered.lock().is_empty());
    }

    #[tokio::test]
    async fn reapplying_a_message_is_idempotent() {
        let l1 = StateCache::new();
        let list_id = Uuid::new_v4();
        l1.set(list_id, ListState::new("l", Uuid::new_v4(), 1.0))
            .await;

        let msg = UpdateMessage::ItemAdded {
            list_id,
            rev: 2.0,
            item: item(list_id),
        };
        apply_to_l1(&l1, &msg).await;
        let once = l1.get(list_id).await.unwrap();
        apply_to_l1(&l1, &msg).await;
        let twice = l1.get(list_id).await.unwrap();
        assert_eq!(once, twice);
    }
}
