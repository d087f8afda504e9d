//! Write-behind worker.
//!
//! Decouples the hot mutation path from durable persistence: services push
//! [`WriteOp`]s onto a bounded queue and a single consumer task maps them
//! to store calls. Every queued op corresponds to a mutation already
//! committed to the Redis hash, so the store is eventually consistent with
//! the cache.
//!
//! The queue is best-effort. Overflow drops the op and bumps
//! `writes_failed`; each task is attempted exactly once and failures are
//! logged and dropped.
//!
//! TODO: dead-letter the dropped and failed ops once there is a broker to
//! put them on; today they are only counted.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use collab_common::{ItemPatch, ListMember, TodoItem, TodoList};
use collab_store::Store;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A durable-store mutation, queued after the cache tier committed it.
#[derive(Debug, Clone)]
pub enum WriteOp {
    AddItem(TodoItem),
    UpdateItem {
        item_id: Uuid,
        patch: ItemPatch,
        updated_at: DateTime<Utc>,
    },
    DeleteItem {
        item_id: Uuid,
    },
    CreateList(TodoList),
    UpdateList {
        list_id: Uuid,
        name: String,
        updated_at: DateTime<Utc>,
    },
    UpsertMember(ListMember),
    RemoveMember {
        list_id: Uuid,
        user_id: Uuid,
    },
}

impl WriteOp {
    fn kind(&self) -> &'static str {
        match self {
            Self::AddItem(_) => "add_item",
            Self::UpdateItem { .. } => "update_item",
            Self::DeleteItem { .. } => "delete_item",
            Self::CreateList(_) => "create_list",
            Self::UpdateList { .. } => "update_list",
            Self::UpsertMember(_) => "upsert_member",
            Self::RemoveMember { .. } => "remove_member",
        }
    }
}

/// Worker counters, surfaced on the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct WriterStats {
    pub running: bool,
    pub queue_size: usize,
    pub writes_processed: u64,
    pub writes_failed: u64,
}

pub struct WriteBehindWorker {
    tx: flume::Sender<WriteOp>,
    running: Arc<AtomicBool>,
    token: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    writes_processed: Arc<AtomicU64>,
    writes_failed: Arc<AtomicU64>,
}

impl WriteBehindWorker {
    /// Spawn the consumer task over a queue of the given capacity.
    pub fn start(store: Arc<dyn Store>, queue_size: usize) -> Self {
        let (tx, rx) = flume::bounded::<WriteOp>(queue_size);
        let running = Arc::new(AtomicBool::new(true));
        let token = CancellationToken::new();
        let writes_processed = Arc::new(AtomicU64::new(0));
        let writes_failed = Arc::new(AtomicU64::new(0));

        let task_running = running.clone();
        let task_token = token.clone();
        let task_processed = writes_processed.clone();
        let task_failed = writes_failed.clone();
        let handle = tokio::spawn(async move {
            info!("write-behind worker started");

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    op = rx.recv_async() => {
                        let Ok(op) = op else { break };
                        let kind = op.kind();
                        match process(store.as_ref(), op).await {
                            Ok(()) => {
                                task_processed.fetch_add(1, Ordering::SeqCst);
                                debug!(kind, "persisted write-behind op");
                            }
                            Err(e) => {
                                task_failed.fetch_add(1, Ordering::SeqCst);
                                error!(kind, error = %e, "write-behind op failed, dropping");
                            }
                        }
                    }
                }
            }

            task_running.store(false, Ordering::SeqCst);
            info!("write-behind worker stopped");
        });

        Self {
            tx,
            running,
            token,
            handle: Mutex::new(Some(handle)),
            writes_processed,
            writes_failed,
        }
    }

    /// Non-blocking enqueue. A full queue drops the op and counts it as a
    /// failed write.
    pub fn enqueue(&self, op: WriteOp) {
        match self.tx.try_send(op) {
            Ok(()) => {}
            Err(flume::TrySendError::Full(op)) => {
                error!(kind = op.kind(), "write queue full, dropping op");
                self.writes_failed.fetch_add(1, Ordering::SeqCst);
            }
            Err(flume::TrySendError::Disconnected(op)) => {
                warn!(kind = op.kind(), "write queue closed, dropping op");
                self.writes_failed.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> WriterStats {
        WriterStats {
            running: self.is_running(),
            queue_size: self.tx.len(),
            writes_processed: self.writes_processed.load(Ordering::SeqCst),
            writes_failed: self.writes_failed.load(Ordering::SeqCst),
        }
    }

    /// Stop the consumer after the task currently in flight; queued tasks
    /// are lost. Bounded by a five second join.
    pub async fn stop(&self) {
        self.token.cancel();
        if let Some(handle) = self.handle.lock().await.take() {
            if tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                warn!("write-behind worker did not stop within 5s");
            }
        }
        let stats = self.stats();
        info!(
            processed = stats.writes_processed,
            failed = stats.writes_failed,
            still_queued = stats.queue_size,
            "write-behind worker shut down"
        );
    }
}

async fn process(store: &dyn Store, op: WriteOp) -> collab_store::Result<()> {
    match op {
        WriteOp::AddItem(item) => store.create_item(&item).await,
        WriteOp::UpdateItem {
            item_id,
            patch,
            updated_at,
        } => store.update_item(item_id, &patch, updated_at).await,
        WriteOp::DeleteItem { item_id } => store.soft_delete_item(item_id).await,
        WriteOp::CreateList(list) => store.create_list(&list).await,
        WriteOp::UpdateList {
            list_id,
            name,
            updated_at,
        } => store.update_list_name(list_id, &name, updated_at).await,
        WriteOp::UpsertMember(member) => store.upsert_member(&member).await,
        WriteOp::RemoveMember { list_id, user_id } => {
            store.remove_member(list_id, user_id).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use collab_common::{ItemStatus, UserRole};
    use collab_store::{MemStore, Result as StoreResult};
    use tokio::sync::Semaphore;

    fn item() -> TodoItem {
        let now = Utc::now();
        TodoItem {
            id: Uuid::new_v4(),
            list_id: Uuid::new_v4(),
            name: "milk".into(),
            description: String::new(),
            status: ItemStatus::NotStarted,
            done: false,
            due_date: None,
            media_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    /// Store that parks every write until a permit is released.
    struct GatedStore {
        inner: MemStore,
        gate: Semaphore,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: MemStore::new(),
                gate: Semaphore::new(0),
            }
        }
    }

    #[async_trait]
    impl Store for GatedStore {
        async fn create_list(&self, list: &TodoList) -> StoreResult<()> {
            let _permit = self.gate.acquire().await.expect("gate open");
            self.inner.create_list(list).await
        }
        async fn update_list_name(
            &self,
            list_id: Uuid,
            name: &str,
            updated_at: DateTime<Utc>,
        ) -> StoreResult<()> {
            self.inner.update_list_name(list_id, name, updated_at).await
        }
        async fn soft_delete_list(&self, list_id: Uuid) -> StoreResult<()> {
            self.inner.soft_delete_list(list_id).await
        }
        async fn get_list(&self, list_id: Uuid) -> StoreResult<Option<TodoList>> {
            self.inner.get_list(list_id).await
        }
        async fn accessible_list_ids(&self, user_id: Uuid) -> StoreResult<Vec<Uuid>> {
            self.inner.accessible_list_ids(user_id).await
        }
        async fn create_item(&self, item: &TodoItem) -> StoreResult<()> {
            let _permit = self.gate.acquire().await.expect("gate open");
            self.inner.create_item(item).await
        }
        async fn update_item(
            &self,
            item_id: Uuid,
            patch: &ItemPatch,
            updated_at: DateTime<Utc>,
        ) -> StoreResult<()> {
            self.inner.update_item(item_id, patch, updated_at).await
        }
        async fn soft_delete_item(&self, item_id: Uuid) -> StoreResult<()> {
            self.inner.soft_delete_item(item_id).await
        }
        async fn get_item(&self, item_id: Uuid) -> StoreResult<Option<TodoItem>> {
            self.inner.get_item(item_id).await
        }
        async fn items_for_list(&self, list_id: Uuid) -> StoreResult<Vec<TodoItem>> {
            self.inner.items_for_list(list_id).await
        }
        async fn get_member(
            &self,
            list_id: Uuid,
            user_id: Uuid,
        ) -> StoreResult<Option<ListMember>> {
            self.inner.get_member(list_id, user_id).await
        }
        async fn upsert_member(&self, member: &ListMember) -> StoreResult<()> {
            self.inner.upsert_member(member).await
        }
        async fn remove_member(&self, list_id: Uuid, user_id: Uuid) -> StoreResult<()> {
            self.inner.remove_member(list_id, user_id).await
        }
    }

    #[tokio::test]
    async fn drains_ops_into_the_store() {
        let store = Arc::new(MemStore::new());
        let worker = WriteBehindWorker::start(store.clone(), 16);

        let it = item();
        let member = ListMember {
            list_id: it.list_id,
            user_id: Uuid::new_v4(),
            role: UserRole::Owner,
            created_at: Utc::now(),
        };
        worker.enqueue(WriteOp::AddItem(it.clone()));
        worker.enqueue(WriteOp::UpsertMember(member.clone()));
        worker.enqueue(WriteOp::DeleteItem { item_id: it.id });

        wait_for(|| worker.stats().writes_processed == 3).await;

        assert_eq!(store.item_is_deleted(it.id), Some(true));
        assert_eq!(store.member_count(), 1);
        assert_eq!(worker.stats().writes_failed, 0);
        worker.stop().await;
    }

    #[tokio::test]
    async fn overflow_drops_and_counts_without_failing_the_caller() {
        let store = Arc::new(GatedStore::new());
        let worker = WriteBehindWorker::start(store.clone(), 4);

        for _ in 0..10 {
            worker.enqueue(WriteOp::AddItem(item()));
        }

        // One op may already be in flight behind the gate; the queue holds
        // four more, everything else must have been dropped.
        let stats = worker.stats();
        assert!(
            stats.writes_failed >= 5,
            "expected at least 5 drops, got {}",
            stats.writes_failed
        );
        assert!(stats.queue_size <= 4);

        store.gate.add_permits(100);
        wait_for(|| {
            let s = worker.stats();
            s.writes_processed + s.writes_failed == 10
        })
        .await;

        let stats = worker.stats();
        assert_eq!(stats.writes_processed + stats.writes_failed, 10);
        assert!(stats.writes_processed >= 4);
        worker.stop().await;
    }

    #[tokio::test]
    async fn update_against_missing_row_still_counts_as_processed() {
        let store = Arc::new(MemStore::new());
        let worker = WriteBehindWorker::start(store.clone(), 16);

        worker.enqueue(WriteOp::UpdateItem {
            item_id: Uuid::new_v4(),
            patch: ItemPatch::default(),
            updated_at: Utc::now(),
        });
        wait_for(|| worker.stats().writes_processed == 1).await;
        worker.stop().await;
    }

    #[tokio::test]
    async fn stop_exits_promptly_and_clears_running() {
        let store = Arc::new(MemStore::new());
        let worker = WriteBehindWorker::start(store, 4);
        assert!(worker.is_running());

        let started = std::time::Instant::now();
        worker.stop().await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!worker.is_running());
    }
}
