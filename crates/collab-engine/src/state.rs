//! Per-replica (L1) state cache.
//!
//! A plain map of loaded lists guarded by one read-write lock. Entries are
//! advisory mirrors of the Redis hash: both the originating coordinator
//! call and the Pub/Sub listener write here, in either order, so every
//! apply is guarded by the message revision. An apply is accepted iff
//! `incoming rev >= stored rev`.

use std::collections::HashMap;

use collab_common::{ListState, TodoItem};
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

#[derive(Default)]
pub struct StateCache {
    lists: RwLock<HashMap<Uuid, ListState>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has(&self, list_id: Uuid) -> bool {
        self.lists.read().await.contains_key(&list_id)
    }

    pub async fn get(&self, list_id: Uuid) -> Option<ListState> {
        self.lists.read().await.get(&list_id).cloned()
    }

    pub async fn set(&self, list_id: Uuid, state: ListState) {
        self.lists.write().await.insert(list_id, state);
    }

    /// Overwrite the revision stamp, never moving it backwards.
    pub async fn set_rev(&self, list_id: Uuid, rev: f64) {
        if let Some(entry) = self.lists.write().await.get_mut(&list_id) {
            if rev >= entry.rev {
                entry.rev = rev;
            }
        }
    }

    /// Insert an item, ignored when the list is not loaded here or the
    /// revision is older than what we already hold.
    pub async fn add_item(&self, list_id: Uuid, rev: f64, item: TodoItem) {
        let mut lists = self.lists.write().await;
        if let Some(entry) = lists.get_mut(&list_id) {
            if rev >= entry.rev {
                entry.items.insert(item.id, item);
                entry.rev = rev;
            }
        }
    }

    /// Replace an item with its merged record. Items are keyed by id so
    /// re-applying the same message is a no-op.
    pub async fn update_item(&self, list_id: Uuid, rev: f64, item: TodoItem) {
        let mut lists = self.lists.write().await;
        if let Some(entry) = lists.get_mut(&list_id) {
            if rev >= entry.rev && entry.items.contains_key(&item.id) {
                entry.items.insert(item.id, item);
                entry.rev = rev;
            }
        }
    }

    /// Drop an item from the mirror. The L2 hash keeps a JSON null in its
    /// place; L1 removes the key entirely.
    pub async fn delete_item(&self, list_id: Uuid, rev: f64, item_id: Uuid) {
        let mut lists = self.lists.write().await;
        if let Some(entry) = lists.get_mut(&list_id) {
            if rev >= entry.rev {
                entry.items.remove(&item_id);
                entry.rev = rev;
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.lists.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lists.read().await.is_empty()
    }

    /// `(list_id, rev, item count)` for every loaded list; the admin cache
    /// endpoint renders this.
    pub async fn summary(&self) -> Vec<(Uuid, f64, usize)> {
        self.lists
            .read()
            .await
            .iter()
            .map(|(id, state)| (*id, state.rev, state.items.len()))
            .collect()
    }

    /// Clear every entry, returning how many lists were dropped.
    pub async fn flush_all(&self) -> usize {
        let mut lists = self.lists.write().await;
        let count = lists.len();
        lists.clear();
        info!(count, "flushed all cached list states");
        count
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use collab_common::ItemStatus;

    fn item(list_id: Uuid, name: &str) -> TodoItem {
        let now = Utc::now();
        TodoItem {
            id: Uuid::new_v4(),
            list_id,
            name: name.into(),
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
    async fn applies_are_ignored_for_unloaded_lists() {
        let cache = StateCache::new();
        let list_id = Uuid::new_v4();
        cache.add_item(list_id, 5.0, item(list_id, "a")).await;
        assert!(!cache.has(list_id).await);
    }

    #[tokio::test]
    async fn stale_revision_is_not_applied() {
        let cache = StateCache::new();
        let list_id = Uuid::new_v4();
        let owner = Uuid::new_v4();
        cache.set(list_id, ListState::new("l", owner, 10.0)).await;

        cache.add_item(list_id, 9.0, item(list_id, "old")).await;
        let state = cache.get(list_id).await.unwrap();
        assert!(state.items.is_empty());
        assert_eq!(state.rev, 10.0);

        cache.add_item(list_id, 10.0, item(list_id, "same-rev")).await;
        assert_eq!(cache.get(list_id).await.unwrap().items.len(), 1);
    }

    #[tokio::test]
    async fn rev_never_moves_backwards() {
        let cache = StateCache::new();
        let list_id = Uuid::new_v4();
        cache
            .set(list_id, ListState::new("l", Uuid::new_v4(), 3.0))
            .await;
        cache.set_rev(list_id, 2.0).await;
        assert_eq!(cache.get(list_id).await.unwrap().rev, 3.0);
        cache.set_rev(list_id, 4.0).await;
        assert_eq!(cache.get(list_id).await.unwrap().rev, 4.0);
    }

    #[tokio::test]
    async fn update_requires_existing_item() {
        let cache = StateCache::new();
        let list_id = Uuid::new_v4();
        cache
            .set(list_id, ListState::new("l", Uuid::new_v4(), 1.0))
            .await;

        let ghost = item(list_id, "ghost");
        cache.update_item(list_id, 2.0, ghost).await;
        assert!(cache.get(list_id).await.unwrap().items.is_empty());
    }

    #[tokio::test]
    async fn flush_reports_dropped_count() {
        let cache = StateCache::new();
        for _ in 0..3 {
            cache
                .set(Uuid::new_v4(), ListState::new("l", Uuid::new_v4(), 1.0))
                .await;
        }
        assert_eq!(cache.flush_all().await, 3);
        assert!(cache.is_empty().await);
    }
}
