//! Domain types for lists, items and memberships.
//!
//! These records travel across all three cache tiers: as sqlx rows (L3),
//! JSON inside the Redis hash (L2) and plain structs in the per-replica
//! cache (L1). Field names are the wire format.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a todo item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl Default for ItemStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl FromStr for ItemStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(Self::NotStarted),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            other => Err(ParseEnumError::new("ItemStatus", other)),
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Access role a user holds on a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Owner,
    Editor,
    Viewer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Editor => "editor",
            Self::Viewer => "viewer",
        }
    }

    /// Owners and editors may mutate list content.
    pub fn can_edit(&self) -> bool {
        matches!(self, Self::Owner | Self::Editor)
    }
}

impl FromStr for UserRole {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Self::Owner),
            "editor" => Ok(Self::Editor),
            "viewer" => Ok(Self::Viewer),
            other => Err(ParseEnumError::new("UserRole", other)),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// A todo item, the unit of collaboration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: Uuid,
    pub list_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: ItemStatus,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TodoItem {
    /// Merge a partial update into this item. `None` fields are left
    /// unchanged; `updated_at` is stamped by the caller.
    pub fn apply_patch(&mut self, patch: &ItemPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(description) = &patch.description {
            self.description = description.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(done) = patch.done {
            self.done = done;
        }
        if let Some(due_date) = &patch.due_date {
            self.due_date = Some(due_date.clone());
        }
        if let Some(media_url) = &patch.media_url {
            self.media_url = Some(media_url.clone());
        }
    }
}

/// A partial item update. Only the present fields are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ItemStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
}

/// A todo list row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoList {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    #[serde(default)]
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A membership row granting `user_id` a role on `list_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListMember {
    pub list_id: Uuid,
    pub user_id: Uuid,
    pub role: UserRole,
    pub created_at: DateTime<Utc>,
}

/// In-memory state of one list as held in the per-replica (L1) cache
/// and encoded into the Redis (L2) hash.
///
/// `rev` is the floating-point revision stamp minted by the atomic Redis
/// scripts; L1 copies of it are advisory, L2 is authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListState {
    pub rev: f64,
    pub list_name: String,
    pub owner_id: Uuid,
    pub items: HashMap<Uuid, TodoItem>,
}

impl ListState {
    pub fn new(list_name: impl Into<String>, owner_id: Uuid, rev: f64) -> Self {
        Self {
            rev,
            list_name: list_name.into(),
            owner_id,
            items: HashMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str) -> TodoItem {
        let now = Utc::now();
        TodoItem {
            id: Uuid::new_v4(),
            list_id: Uuid::new_v4(),
            name: name.to_string(),
            description: String::new(),
            status: ItemStatus::NotStarted,
            done: false,
            due_date: None,
            media_url: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn status_round_trips_as_snake_case() {
        let json = serde_json::to_string(&ItemStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
        assert_eq!("completed".parse::<ItemStatus>().unwrap(), ItemStatus::Completed);
        assert!("finished".parse::<ItemStatus>().is_err());
    }

    #[test]
    fn edit_rights_by_role() {
        assert!(UserRole::Owner.can_edit());
        assert!(UserRole::Editor.can_edit());
        assert!(!UserRole::Viewer.can_edit());
        assert_eq!("viewer".parse::<UserRole>().unwrap(), UserRole::Viewer);
        assert!("admin".parse::<UserRole>().is_err());
    }

    #[test]
    fn patch_merges_only_present_fields() {
        let mut it = item("milk");
        it.apply_patch(&ItemPatch {
            done: Some(true),
            ..Default::default()
        });
        assert!(it.done);
        assert_eq!(it.name, "milk");

        it.apply_patch(&ItemPatch {
            name: Some("oat milk".into()),
            status: Some(ItemStatus::Completed),
            ..Default::default()
        });
        assert_eq!(it.name, "oat milk");
        assert_eq!(it.status, ItemStatus::Completed);
        assert!(it.done);
    }
}
