//! In-memory implementation of every store trait.

use std::collections::HashMap;

use async_trait::async_trait;
use jiff::Timestamp;
use murmur_core::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Map;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    AttributeDefinitionStore, ConnectionStore, MetadataPatch, PlatformCredentialStore, RetryJob,
    RetryQueue, StatusSync, UserRecord, UserStore,
};
use crate::capability::{InboundWebhookResult, PlatformCredentials};
use crate::connection::{ConnectionStatus, IntegrationConnection};
use crate::definition::IntegrationType;
use crate::sync::UserAttributeDefinition;

/// A status change recorded by [`MemoryStore`]'s [`StatusSync`].
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    pub workspace_id: Uuid,
    pub integration_type: IntegrationType,
    pub result: InboundWebhookResult,
}

/// Initial data for a development store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Seed {
    /// Platform credentials per integration type.
    pub platform_credentials: HashMap<IntegrationType, PlatformCredentials>,
    /// Users per workspace.
    pub users: Vec<SeedUser>,
    /// Attribute definitions per workspace.
    pub attribute_definitions: HashMap<Uuid, Vec<UserAttributeDefinition>>,
}

/// A seeded user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedUser {
    pub workspace_id: Uuid,
    #[serde(default = "Uuid::now_v7")]
    pub principal_id: Uuid,
    pub email: String,
}

#[derive(Debug, Default)]
struct Inner {
    connections: HashMap<Uuid, IntegrationConnection>,
    credentials: HashMap<IntegrationType, PlatformCredentials>,
    users: HashMap<Uuid, (Uuid, UserRecord)>,
    attributes: HashMap<Uuid, Vec<UserAttributeDefinition>>,
    status_updates: Vec<StatusUpdate>,
    retry_jobs: Vec<RetryJob>,
    fail_user_writes: bool,
}

/// Process-local store backing tests and local development.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated from `seed`.
    pub async fn from_seed(seed: Seed) -> Self {
        let store = Self::new();
        for (integration_type, credentials) in seed.platform_credentials {
            store
                .set_platform_credentials(integration_type, credentials)
                .await;
        }
        for user in seed.users {
            store
                .insert_user_with_id(user.workspace_id, user.principal_id, &user.email)
                .await;
        }
        for (workspace_id, definitions) in seed.attribute_definitions {
            store
                .set_attribute_definitions(workspace_id, definitions)
                .await;
        }
        store
    }

    /// Adds a user and returns its principal id.
    pub async fn insert_user(&self, workspace_id: Uuid, email: &str) -> Uuid {
        self.insert_user_with_id(workspace_id, Uuid::now_v7(), email)
            .await
    }

    async fn insert_user_with_id(&self, workspace_id: Uuid, principal_id: Uuid, email: &str) -> Uuid {
        let record = UserRecord {
            principal_id,
            email: email.to_owned(),
            metadata: Map::new(),
        };
        self.inner
            .write()
            .await
            .users
            .insert(principal_id, (workspace_id, record));
        principal_id
    }

    /// Returns a user by principal id.
    pub async fn user(&self, principal_id: Uuid) -> Option<UserRecord> {
        self.inner
            .read()
            .await
            .users
            .get(&principal_id)
            .map(|(_, record)| record.clone())
    }

    /// Configures platform credentials.
    pub async fn set_platform_credentials(
        &self,
        integration_type: IntegrationType,
        credentials: PlatformCredentials,
    ) {
        self.inner
            .write()
            .await
            .credentials
            .insert(integration_type, credentials);
    }

    /// Replaces a workspace's attribute definitions.
    pub async fn set_attribute_definitions(
        &self,
        workspace_id: Uuid,
        definitions: Vec<UserAttributeDefinition>,
    ) {
        self.inner
            .write()
            .await
            .attributes
            .insert(workspace_id, definitions);
    }

    /// Makes metadata merges fail, to exercise post-acknowledgement errors.
    pub async fn set_fail_user_writes(&self, fail: bool) {
        self.inner.write().await.fail_user_writes = fail;
    }

    /// Returns every status change applied so far.
    pub async fn status_updates(&self) -> Vec<StatusUpdate> {
        self.inner.read().await.status_updates.clone()
    }

    /// Returns every queued retry.
    pub async fn retry_jobs(&self) -> Vec<RetryJob> {
        self.inner.read().await.retry_jobs.clone()
    }

    /// Returns a connection by id.
    pub async fn connection(&self, connection_id: Uuid) -> Option<IntegrationConnection> {
        self.inner
            .read()
            .await
            .connections
            .get(&connection_id)
            .cloned()
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn find(
        &self,
        workspace_id: Uuid,
        integration_type: IntegrationType,
    ) -> Result<Option<IntegrationConnection>> {
        let inner = self.inner.read().await;
        Ok(inner
            .connections
            .values()
            .find(|c| c.workspace_id == workspace_id && c.integration_type == integration_type)
            .cloned())
    }

    async fn list_active(&self, workspace_id: Uuid) -> Result<Vec<IntegrationConnection>> {
        let inner = self.inner.read().await;
        let mut connections: Vec<_> = inner
            .connections
            .values()
            .filter(|c| c.workspace_id == workspace_id && c.is_active())
            .cloned()
            .collect();
        connections.sort_by_key(|c| c.integration_type);
        Ok(connections)
    }

    async fn list_active_by_type(
        &self,
        integration_type: IntegrationType,
    ) -> Result<Vec<IntegrationConnection>> {
        let inner = self.inner.read().await;
        Ok(inner
            .connections
            .values()
            .filter(|c| c.integration_type == integration_type && c.is_active())
            .cloned()
            .collect())
    }

    async fn upsert(&self, mut connection: IntegrationConnection) -> Result<IntegrationConnection> {
        let mut inner = self.inner.write().await;

        let existing = inner
            .connections
            .values()
            .find(|c| {
                c.workspace_id == connection.workspace_id
                    && c.integration_type == connection.integration_type
            })
            .map(|c| (c.id, c.created_at));

        if let Some((id, created_at)) = existing {
            connection.id = id;
            connection.created_at = created_at;
            connection.updated_at = Timestamp::now();
        }

        inner.connections.insert(connection.id, connection.clone());
        Ok(connection)
    }

    async fn mark_error(&self, connection_id: Uuid, message: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let connection = inner
            .connections
            .get_mut(&connection_id)
            .ok_or_else(|| Error::not_found().with_message("connection not found"))?;

        connection.status = ConnectionStatus::Error;
        connection.last_error = Some(message.to_owned());
        connection.updated_at = Timestamp::now();
        Ok(())
    }

    async fn delete(&self, connection_id: Uuid) -> Result<bool> {
        Ok(self
            .inner
            .write()
            .await
            .connections
            .remove(&connection_id)
            .is_some())
    }
}

#[async_trait]
impl PlatformCredentialStore for MemoryStore {
    async fn get(&self, integration_type: IntegrationType) -> Result<Option<PlatformCredentials>> {
        Ok(self
            .inner
            .read()
            .await
            .credentials
            .get(&integration_type)
            .cloned())
    }

    async fn configured_types(&self) -> Result<Vec<IntegrationType>> {
        let mut types: Vec<_> = self.inner.read().await.credentials.keys().copied().collect();
        types.sort();
        Ok(types)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, workspace_id: Uuid, email: &str) -> Result<Option<UserRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|(workspace, record)| {
                *workspace == workspace_id && record.email.eq_ignore_ascii_case(email.trim())
            })
            .map(|(_, record)| record.clone()))
    }

    async fn find_by_ids(
        &self,
        workspace_id: Uuid,
        principal_ids: &[Uuid],
    ) -> Result<Vec<UserRecord>> {
        let inner = self.inner.read().await;
        Ok(principal_ids
            .iter()
            .filter_map(|id| inner.users.get(id))
            .filter(|(workspace, _)| *workspace == workspace_id)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn merge_metadata(&self, principal_id: Uuid, patch: &MetadataPatch) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.fail_user_writes {
            return Err(Error::service_unavailable().with_message("user store unavailable"));
        }

        let (_, record) = inner
            .users
            .get_mut(&principal_id)
            .ok_or_else(|| Error::not_found().with_message("user not found"))?;
        patch.apply(&mut record.metadata);
        Ok(())
    }
}

#[async_trait]
impl AttributeDefinitionStore for MemoryStore {
    async fn list(&self, workspace_id: Uuid) -> Result<Vec<UserAttributeDefinition>> {
        Ok(self
            .inner
            .read()
            .await
            .attributes
            .get(&workspace_id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl StatusSync for MemoryStore {
    async fn apply(
        &self,
        workspace_id: Uuid,
        integration_type: IntegrationType,
        result: &InboundWebhookResult,
    ) -> Result<()> {
        self.inner.write().await.status_updates.push(StatusUpdate {
            workspace_id,
            integration_type,
            result: result.clone(),
        });
        Ok(())
    }
}

#[async_trait]
impl RetryQueue for MemoryStore {
    async fn enqueue(&self, job: RetryJob) -> Result<()> {
        self.inner.write().await.retry_jobs.push(job);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::connection::ConfigMap;

    #[tokio::test]
    async fn test_upsert_replaces_same_workspace_and_type() {
        let store = MemoryStore::new();
        let workspace_id = Uuid::new_v4();

        let first = store
            .upsert(IntegrationConnection::new(
                workspace_id,
                IntegrationType::Slack,
                None,
                ConfigMap::new(),
                vec![1],
            ))
            .await
            .unwrap();
        store.mark_error(first.id, "token_revoked").await.unwrap();

        let second = store
            .upsert(IntegrationConnection::new(
                workspace_id,
                IntegrationType::Slack,
                None,
                ConfigMap::new(),
                vec![2],
            ))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let stored = store.connection(first.id).await.unwrap();
        assert!(stored.is_active());
        assert_eq!(stored.secrets, vec![2]);
        assert_eq!(store.list_active(workspace_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_error_hides_from_active() {
        let store = MemoryStore::new();
        let workspace_id = Uuid::new_v4();
        let connection = store
            .upsert(IntegrationConnection::new(
                workspace_id,
                IntegrationType::Github,
                None,
                ConfigMap::new(),
                vec![],
            ))
            .await
            .unwrap();

        store.mark_error(connection.id, "bad credentials").await.unwrap();

        assert!(store.list_active(workspace_id).await.unwrap().is_empty());
        let stored = store.find(workspace_id, IntegrationType::Github).await.unwrap().unwrap();
        assert_eq!(stored.status, ConnectionStatus::Error);
        assert_eq!(stored.last_error.as_deref(), Some("bad credentials"));
    }

    #[tokio::test]
    async fn test_users_are_scoped_by_workspace() {
        let store = MemoryStore::new();
        let workspace_a = Uuid::new_v4();
        let workspace_b = Uuid::new_v4();
        let id = store.insert_user(workspace_a, "Ada@Example.com").await;

        assert!(store.find_by_email(workspace_a, "ada@example.com").await.unwrap().is_some());
        assert!(store.find_by_email(workspace_b, "ada@example.com").await.unwrap().is_none());
        assert!(store.find_by_ids(workspace_b, &[id]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_from_seed() {
        let workspace_id = Uuid::new_v4();
        let mut seed: Seed = serde_json::from_value(json!({
            "platformCredentials": { "slack": { "clientId": "a", "clientSecret": "b" } },
            "users": [{ "workspaceId": workspace_id, "email": "ada@example.com" }],
        }))
        .unwrap();
        seed.attribute_definitions.insert(
            workspace_id,
            vec![UserAttributeDefinition::new(
                "plan",
                "plan",
                crate::sync::AttributeType::String,
            )],
        );

        let store = MemoryStore::from_seed(seed).await;
        assert_eq!(
            store.configured_types().await.unwrap(),
            vec![IntegrationType::Slack]
        );
        assert!(store.find_by_email(workspace_id, "ada@example.com").await.unwrap().is_some());
        assert_eq!(store.list(workspace_id).await.unwrap().len(), 1);
    }
}
