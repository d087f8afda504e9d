//! Durable store adapter (the L3 tier).
//!
//! The cache is authoritative; this layer is eventually consistent and only
//! written through the write-behind worker or read on cold start. All
//! deletes are soft deletes.

mod mem;
mod pg;

pub use mem::MemStore;
pub use pg::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collab_common::{ItemPatch, ListMember, TodoItem, TodoList};
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("corrupt {entity} row {id}: {detail}")]
    Corrupt {
        entity: &'static str,
        id: Uuid,
        detail: String,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Row-level CRUD over `lists`, `items` and `members`.
///
/// Implemented by [`PgStore`] in deployments and [`MemStore`] in tests.
#[async_trait]
pub trait Store: Send + Sync {
    // --- lists ---
    async fn create_list(&self, list: &TodoList) -> Result<()>;
    async fn update_list_name(
        &self,
        list_id: Uuid,
        name: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn soft_delete_list(&self, list_id: Uuid) -> Result<()>;
    /// Returns `None` for missing or soft-deleted lists.
    async fn get_list(&self, list_id: Uuid) -> Result<Option<TodoList>>;
    /// All list ids the user owns or is a member of, deduplicated.
    async fn accessible_list_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>>;

    // --- items ---
    async fn create_item(&self, item: &TodoItem) -> Result<()>;
    async fn update_item(
        &self,
        item_id: Uuid,
        patch: &ItemPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn soft_delete_item(&self, item_id: Uuid) -> Result<()>;
    async fn get_item(&self, item_id: Uuid) -> Result<Option<TodoItem>>;
    /// Non-deleted items of a list.
    async fn items_for_list(&self, list_id: Uuid) -> Result<Vec<TodoItem>>;

    // --- members ---
    async fn get_member(&self, list_id: Uuid, user_id: Uuid) -> Result<Option<ListMember>>;
    async fn upsert_member(&self, member: &ListMember) -> Result<()>;
    async fn remove_member(&self, list_id: Uuid, user_id: Uuid) -> Result<()>;
}
