use crate::auth::UserRole;
use crate::errors::ServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A user as known to the external directory.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: UserRole,
}

/// Read-only view of the organisation's user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<DirectoryUser>, ServiceError>;

    /// Ids of every user holding one of the given roles.
    async fn find_ids_by_roles(&self, roles: &[UserRole]) -> Result<Vec<Uuid>, ServiceError>;
}

/// In-memory directory used by tests and single-process deployments.
#[derive(Default)]
pub struct InMemoryUserDirectory {
    users: Arc<RwLock<Vec<DirectoryUser>>>,
}

impl InMemoryUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_user(&self, user: DirectoryUser) {
        self.users.write().await.push(user);
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<DirectoryUser>, ServiceError> {
        Ok(self.users.read().await.iter().find(|u| u.id == id).cloned())
    }

    async fn find_ids_by_roles(&self, roles: &[UserRole]) -> Result<Vec<Uuid>, ServiceError> {
        Ok(self
            .users
            .read()
            .await
            .iter()
            .filter(|u| roles.contains(&u.role))
            .map(|u| u.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn finds_users_by_role() {
        let directory = InMemoryUserDirectory::new();
        let manager_id = Uuid::new_v4();
        directory
            .add_user(DirectoryUser {
                id: manager_id,
                name: "Maha".into(),
                email: "maha@example.com".into(),
                role: UserRole::Manager,
            })
            .await;
        directory
            .add_user(DirectoryUser {
                id: Uuid::new_v4(),
                name: "Omar".into(),
                email: "omar@example.com".into(),
                role: UserRole::Employee,
            })
            .await;

        let ids = directory
            .find_ids_by_roles(&[UserRole::Manager, UserRole::AssistantManager])
            .await
            .unwrap();
        assert_eq!(ids, vec![manager_id]);
    }
}
