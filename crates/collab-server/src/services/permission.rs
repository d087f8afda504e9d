//! Role-based gate for mutations and room joins.

use std::sync::Arc;

use collab_common::UserRole;
use collab_store::Store;
use uuid::Uuid;

use super::{ServiceError, ServiceResult};

pub struct PermissionService {
    store: Arc<dyn Store>,
}

impl PermissionService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The caller's role on a list, `None` when no membership row exists.
    pub async fn get_user_permission(
        &self,
        list_id: Uuid,
        user_id: Uuid,
    ) -> ServiceResult<Option<UserRole>> {
        let member = self.store.get_member(list_id, user_id).await?;
        Ok(member.map(|m| m.role))
    }

    pub async fn can_view(&self, list_id: Uuid, user_id: Uuid) -> ServiceResult<bool> {
        Ok(self.get_user_permission(list_id, user_id).await?.is_some())
    }

    pub async fn can_edit(&self, list_id: Uuid, user_id: Uuid) -> ServiceResult<bool> {
        Ok(self
            .get_user_permission(list_id, user_id)
            .await?
            .is_some_and(|role| role.can_edit()))
    }

    pub async fn require_edit_permission(
        &self,
        list_id: Uuid,
        user_id: Uuid,
    ) -> ServiceResult<()> {
        if self.can_edit(list_id, user_id).await? {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied(format!(
                "User {user_id} cannot edit list {list_id}"
            )))
        }
    }

    pub async fn require_view_permission(
        &self,
        list_id: Uuid,
        user_id: Uuid,
    ) -> ServiceResult<()> {
        if self.can_view(list_id, user_id).await? {
            Ok(())
        } else {
            Err(ServiceError::PermissionDenied(format!(
                "User {user_id} cannot view list {list_id}"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use collab_common::ListMember;
    use collab_store::MemStore;

    async fn service_with(role: Option<UserRole>) -> (PermissionService, Uuid, Uuid) {
        let store = Arc::new(MemStore::new());
        let list_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();
        if let Some(role) = role {
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
        (PermissionService::new(store), list_id, user_id)
    }

    #[tokio::test]
    async fn owner_and_editor_can_edit() {
        for role in [UserRole::Owner, UserRole::Editor] {
            let (svc, list_id, user_id) = service_with(Some(role)).await;
            assert!(svc.can_edit(list_id, user_id).await.unwrap());
            assert!(svc.require_edit_permission(list_id, user_id).await.is_ok());
        }
    }

    #[tokio::test]
    async fn viewer_can_view_but_not_edit() {
        let (svc, list_id, user_id) = service_with(Some(UserRole::Viewer)).await;
        assert!(svc.can_view(list_id, user_id).await.unwrap());
        assert!(!svc.can_edit(list_id, user_id).await.unwrap());
        assert!(matches!(
            svc.require_edit_permission(list_id, user_id).await,
            Err(ServiceError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn no_membership_means_no_access() {
        let (svc, list_id, user_id) = service_with(None).await;
        assert_eq!(svc.get_user_permission(list_id, user_id).await.unwrap(), None);
        assert!(!svc.can_view(list_id, user_id).await.unwrap());
        assert!(matches!(
            svc.require_view_permission(list_id, user_id).await,
            Err(ServiceError::PermissionDenied(_))
        ));
        assert!(matches!(
            svc.require_edit_permission(list_id, user_id).await,
            Err(ServiceError::PermissionDenied(_))
        ));
    }
}
