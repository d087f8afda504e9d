//! Postgres implementation of the store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collab_common::{ItemPatch, ItemStatus, ListMember, TodoItem, TodoList, UserRole};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{Result, Store, StoreError};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Raw `items` row; status is stored as text.
#[derive(FromRow)]
struct ItemRow {
    id: Uuid,
    list_id: Uuid,
    name: String,
    description: String,
    status: String,
    done: bool,
    due_date: Option<String>,
    media_url: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ItemRow {
    fn into_item(self) -> Result<TodoItem> {
        let status = self
            .status
            .parse::<ItemStatus>()
            .map_err(|e| StoreError::Corrupt {
                entity: "item",
                id: self.id,
                detail: e.to_string(),
            })?;
        Ok(TodoItem {
            id: self.id,
            list_id: self.list_id,
            name: self.name,
            description: self.description,
            status,
            done: self.done,
            due_date: self.due_date,
            media_url: self.media_url,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ListRow {
    id: Uuid,
    name: String,
    owner_id: Uuid,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ListRow> for TodoList {
    fn from(row: ListRow) -> Self {
        TodoList {
            id: row.id,
            name: row.name,
            owner_id: row.owner_id,
            is_deleted: row.is_deleted,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(FromRow)]
struct MemberRow {
    list_id: Uuid,
    user_id: Uuid,
    role: String,
    created_at: DateTime<Utc>,
}

impl MemberRow {
    fn into_member(self) -> Result<ListMember> {
        let role = self
            .role
            .parse::<UserRole>()
            .map_err(|e| StoreError::Corrupt {
                entity: "member",
                id: self.user_id,
                detail: e.to_string(),
            })?;
        Ok(ListMember {
            list_id: self.list_id,
            user_id: self.user_id,
            role,
            created_at: self.created_at,
        })
    }
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self, list), fields(list_id = %list.id))]
    async fn create_list(&self, list: &TodoList) -> Result<()> {
        sqlx::query(
            "INSERT INTO lists (id, name, owner_id, is_deleted, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(list.id)
        .bind(&list.name)
        .bind(list.owner_id)
        .bind(list.is_deleted)
        .bind(list.created_at)
        .bind(list.updated_at)
        .execute(&self.pool)
        .await?;
        debug!("created list row");
        Ok(())
    }

    async fn update_list_name(
        &self,
        list_id: Uuid,
        name: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE lists SET name = $2, updated_at = $3 WHERE id = $1 AND is_deleted = FALSE",
        )
        .bind(list_id)
        .bind(name)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn soft_delete_list(&self, list_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE lists SET is_deleted = TRUE WHERE id = $1")
            .bind(list_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_list(&self, list_id: Uuid) -> Result<Option<TodoList>> {
        let row: Option<ListRow> =
            sqlx::query_as("SELECT * FROM lists WHERE id = $1 AND is_deleted = FALSE")
                .bind(list_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(TodoList::from))
    }

    async fn accessible_list_ids(&self, user_id: Uuid) -> Result<Vec<Uuid>> {
        let ids: Vec<(Uuid,)> = sqlx::query_as(
            "SELECT l.id FROM lists l \
             WHERE l.owner_id = $1 AND l.is_deleted = FALSE \
             UNION \
             SELECT m.list_id FROM members m \
             JOIN lists l ON l.id = m.list_id AND l.is_deleted = FALSE \
             WHERE m.user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    #[instrument(skip(self, item), fields(item_id = %item.id, list_id = %item.list_id))]
    async fn create_item(&self, item: &TodoItem) -> Result<()> {
        sqlx::query(
            "INSERT INTO items \
             (id, list_id, name, description, status, done, due_date, media_url, \
              is_deleted, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, FALSE, $9, $10)",
        )
        .bind(item.id)
        .bind(item.list_id)
        .bind(&item.name)
        .bind(&item.description)
        .bind(item.status.as_str())
        .bind(item.done)
        .bind(&item.due_date)
        .bind(&item.media_url)
        .bind(item.created_at)
        .bind(item.updated_at)
        .execute(&self.pool)
        .await?;
        debug!("created item row");
        Ok(())
    }

    async fn update_item(
        &self,
        item_id: Uuid,
        patch: &ItemPatch,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE items SET \
             name = COALESCE($2, name), \
             description = COALESCE($3, description), \
             status = COALESCE($4, status), \
             done = COALESCE($5, done), \
             due_date = COALESCE($6, due_date), \
             media_url = COALESCE($7, media_url), \
             updated_at = $8 \
             WHERE id = $1 AND is_deleted = FALSE",
        )
        .bind(item_id)
        .bind(&patch.name)
        .bind(&patch.description)
        .bind(patch.status.map(|s| s.as_str().to_string()))
        .bind(patch.done)
        .bind(&patch.due_date)
        .bind(&patch.media_url)
        .bind(updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn soft_delete_item(&self, item_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE items SET is_deleted = TRUE WHERE id = $1")
            .bind(item_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_item(&self, item_id: Uuid) -> Result<Option<TodoItem>> {
        let row: Option<ItemRow> =
            sqlx::query_as("SELECT * FROM items WHERE id = $1 AND is_deleted = FALSE")
                .bind(item_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(ItemRow::into_item).transpose()
    }

    async fn items_for_list(&self, list_id: Uuid) -> Result<Vec<TodoItem>> {
        let rows: Vec<ItemRow> =
            sqlx::query_as("SELECT * FROM items WHERE list_id = $1 AND is_deleted = FALSE")
                .bind(list_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(ItemRow::into_item).collect()
    }

    async fn get_member(&self, list_id: Uuid, user_id: Uuid) -> Result<Option<ListMember>> {
        let row: Option<MemberRow> =
            sqlx::query_as("SELECT * FROM members WHERE list_id = $1 AND user_id = $2")
                .bind(list_id)
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(MemberRow::into_member).transpose()
    }

    #[instrument(skip(self, member), fields(list_id = %member.list_id, user_id = %member.user_id))]
    async fn upsert_member(&self, member: &ListMember) -> Result<()> {
        sqlx::query(
            "INSERT INTO members (list_id, user_id, role, created_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (list_id, user_id) DO UPDATE SET role = EXCLUDED.role",
        )
        .bind(member.list_id)
        .bind(member.user_id)
        .bind(member.role.as_str())
        .bind(member.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_member(&self, list_id: Uuid, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM members WHERE list_id = $1 AND user_id = $2")
            .bind(list_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
