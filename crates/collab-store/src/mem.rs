//! In-memory store used by the test suites and local development.
//!
//! Mirrors the Postgres semantics, including soft deletes and the
//! `(list_id, user_id)` uniqueness key on members.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collab_common::{ItemPatch, ListMember, TodoItem, TodoList};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::{Result, Store};

#[derive(Default)]
struct Inner {
    lists: HashMap<Uuid, TodoList>,
    items: HashMap<Uuid, (TodoItem, bool)>,
    members: HashMap<(Uuid, Uuid), ListMember>,
}

#[derive(Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test helper: true if the item row exists and is soft-deleted.
    pub fn item_is_deleted(&self, item_id: Uuid) -> Option<bool> {
        self.inner
            .lock()
            .items
            .get(&item_id)
            .map(|(_, deleted)| *deleted)
    }

    /// Test helper: number of member rows.
    pub fn member_count(&self) -> usize {
        self.inner.lock().members.len()
    }
}

#[async_trait]
impl Store for MemStore {
    async fn create_list(&self, list: &TodoList) -> Result<()> {
        self.inner.lock().lists.insert(list.id, list.clone());
        Ok(())
    }

    async fn update_list_name(
        &self,
        list_id: Uuid,
        name: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(list) = self.inner.lock().lists.get_mut(&list_id) {
            if !list.is_deleted {
                list.name = name.to_string();
                list.updated_at = updated_at;
            }
        }
        Ok(())
    }

    async fn soft_delete_list(&self, list_id: Uuid) -> Result<()> {
        if let Some(list) = self.inner.lock().lists.get_mut(&list_id) {
            list.is_deleted = true;
        }
        Ok(())
    }

    async fn get_list(&self, list_id: Uuid) -> Result<Option<TodoList>> {
        Ok(self
            .inner
            .lock()
            .lists
            .get(&list_id)
            .filter(|l| !l.is_deleted)
            .cloned())
    }

    async fn accessible_list_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let inner = self.inner.lock();
        let mut ids: Vec<Uuid> = inner
            .lists
            .values()
            .filter(|l| l.owner_id == user_id && !l.is_deleted)
            .map(|l| l.id)
            .collect();
        for member in inner.members.values() {
            if member.user_id == user_id
                && inner
                    .lists
                    .get(&member.list_id)
                    .is_some_and(|l| !l.is_deleted)
                && !ids.contains(&member.list_id)
            {
                ids.push(member.list_id);
            }
        }
        Ok(ids)
    }

    async fn create_item(&self, item: &TodoItem) -> Result<()> {
        self.inner
            .lock()
            .items
            .insert(item.id, (item.clone(), false));
        Ok(())
    }

    async fn update_item(
        &self,
        item_id: Uuid,
        patch: &ItemPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some((item, deleted)) = self.inner.lock().items.get_mut(&item_id) {
            if !*deleted {
                item.apply_patch(patch);
                item.updated_at = updated_at;
            }
        }
        Ok(())
    }

    async fn soft_delete_item(&self, item_id: Uuid) -> Result<()> {
        if let Some((_, deleted)) = self.inner.lock().items.get_mut(&item_id) {
            *deleted = true;
        }
        Ok(())
    }

    async fn get_item(&self, item_id: Uuid) -> Result<Option<TodoItem>> {
        Ok(self
            .inner
            .lock()
            .items
            .get(&item_id)
            .filter(|(_, deleted)| !deleted)
            .map(|(item, _)| item.clone()))
    }

    async fn items_for_list(&self, list_id: Uuid) -> Result<Vec<TodoItem>> {
        Ok(self
            .inner
            .lock()
            .items
            .values()
            .filter(|(item, deleted)| item.list_id == list_id && !deleted)
            .map(|(item, _)| item.clone())
            .collect())
    }

    async fn get_member(&self, list_id: Uuid, user_id: Uuid) -> Result<Option<ListMember>> {
        Ok(self.inner.lock().members.get(&(list_id, user_id)).cloned())
    }

    async fn upsert_member(&self, member: &ListMember) -> Result<()> {
        self.inner
            .lock()
            .members
            .insert((member.list_id, member.user_id), member.clone());
        Ok(())
    }

    async fn remove_member(&self, list_id: Uuid, user_id: Uuid) -> Result<()> {
        self.inner.lock().members.remove(&(list_id, user_id));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use collab_common::{ItemStatus, UserRole};

    fn list(owner: Uuid) -> TodoList {
        let now = Utc::now();
        TodoList {
            id: Uuid::new_v4(),
            name: "groceries".into(),
            owner_id: owner,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        }
    }

    fn item(list_id: Uuid) -> TodoItem {
        let now = Utc::now();
        TodoItem {
            id: Uuid::new_v4(),
            list_id,
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

    #[tokio::test]
    async fn soft_deleted_items_are_invisible() {
        let store = MemStore::new();
        let owner = Uuid::new_v4();
        let l = list(owner);
        let it = item(l.id);
        store.create_list(&l).await.unwrap();
        store.create_item(&it).await.unwrap();

        assert_eq!(store.items_for_list(l.id).await.unwrap().len(), 1);

        store.soft_delete_item(it.id).await.unwrap();
        assert!(store.get_item(it.id).await.unwrap().is_none());
        assert!(store.items_for_list(l.id).await.unwrap().is_empty());
        assert_eq!(store.item_is_deleted(it.id), Some(true));
    }

    #[tokio::test]
    async fn soft_deleted_lists_vanish_from_reads() {
        let store = MemStore::new();
        let owner = Uuid::new_v4();
        let l = list(owner);
        store.create_list(&l).await.unwrap();
        assert!(store.get_list(l.id).await.unwrap().is_some());

        store.soft_delete_list(l.id).await.unwrap();
        assert!(store.get_list(l.id).await.unwrap().is_none());
        assert!(store.accessible_list_ids(owner).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn accessible_lists_merge_owned_and_shared() {
        let store = MemStore::new();
        let owner = Uuid::new_v4();
        let guest = Uuid::new_v4();
        let l = list(owner);
        store.create_list(&l).await.unwrap();

        assert_eq!(store.accessible_list_ids(owner).await.unwrap(), vec![l.id]);
        assert!(store.accessible_list_ids(guest).await.unwrap().is_empty());

        store
            .upsert_member(&ListMember {
                list_id: l.id,
                user_id: guest,
                role: UserRole::Viewer,
                created_at: Utc::now(),
            })
            .await
            .unwrap();
        assert_eq!(store.accessible_list_ids(guest).await.unwrap(), vec![l.id]);
    }

    #[tokio::test]
    async fn member_upsert_replaces_role() {
        let store = MemStore::new();
        let list_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        for role in [UserRole::Viewer, UserRole::Editor] {
            store
                .upsert_member(&ListMember {
                    list_id,
                    user_id,
                    role,
                    created_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        assert_eq!(store.member_count(), 1);
        let member = store.get_member(list_id, user_id).await.unwrap().unwrap();
        assert_eq!(member.role, UserRole::Editor);
    }
}
