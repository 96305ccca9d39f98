//! Storage and collaborator seams consumed by the hub.
//!
//! The hub never talks to a database directly. Persistence of connections
//! and users, status mapping and retry scheduling all live behind these
//! traits; [`MemoryStore`] implements every one of them.

mod memory;

use async_trait::async_trait;
use jiff::Timestamp;
use murmur_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

pub use memory::{MemoryStore, Seed, SeedUser, StatusUpdate};

use crate::capability::{InboundWebhookResult, PlatformCredentials};
use crate::connection::IntegrationConnection;
use crate::definition::IntegrationType;
use crate::event::DomainEvent;
use crate::sync::UserAttributeDefinition;

/// Persistence of workspace connections.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Returns the workspace's connection to `integration_type`, in any status.
    async fn find(
        &self,
        workspace_id: Uuid,
        integration_type: IntegrationType,
    ) -> Result<Option<IntegrationConnection>>;

    /// Lists the workspace's active connections.
    async fn list_active(&self, workspace_id: Uuid) -> Result<Vec<IntegrationConnection>>;

    /// Lists active connections of one type across all workspaces.
    async fn list_active_by_type(
        &self,
        integration_type: IntegrationType,
    ) -> Result<Vec<IntegrationConnection>>;

    /// Inserts the connection, replacing any existing one for the same
    /// workspace and type while keeping its id and creation time.
    async fn upsert(&self, connection: IntegrationConnection) -> Result<IntegrationConnection>;

    /// Flags a connection for admin attention.
    async fn mark_error(&self, connection_id: Uuid, message: &str) -> Result<()>;

    /// Deletes a connection; returns whether it existed.
    async fn delete(&self, connection_id: Uuid) -> Result<bool>;
}

/// Resolves the active connection an inbound delivery belongs to.
///
/// With a workspace the connection must exist and be active. Without one,
/// exactly one active connection of the type must exist; none or several
/// resolve to `None`.
pub(crate) async fn resolve_active(
    connections: &dyn ConnectionStore,
    integration_type: IntegrationType,
    workspace_id: Option<Uuid>,
) -> Result<Option<IntegrationConnection>> {
    match workspace_id {
        Some(workspace_id) => Ok(connections
            .find(workspace_id, integration_type)
            .await?
            .filter(IntegrationConnection::is_active)),
        None => {
            let mut candidates = connections.list_active_by_type(integration_type).await?;
            if candidates.len() == 1 {
                Ok(candidates.pop())
            } else {
                Ok(None)
            }
        }
    }
}

/// Admin-configured, app-level provider credentials.
#[async_trait]
pub trait PlatformCredentialStore: Send + Sync {
    /// Returns the credentials for `integration_type`, if configured.
    async fn get(&self, integration_type: IntegrationType) -> Result<Option<PlatformCredentials>>;

    /// Lists types with credentials configured.
    async fn configured_types(&self) -> Result<Vec<IntegrationType>>;
}

/// A user as seen by the sync orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Principal identifier.
    pub principal_id: Uuid,
    /// Email address.
    pub email: String,
    /// Attributes and system fields.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Fields to merge into a user's metadata in one write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataPatch {
    /// Coerced, definition-filtered attributes.
    pub attributes: Map<String, Value>,
    /// Raw system fields such as external correlation ids.
    pub system: Map<String, Value>,
}

impl MetadataPatch {
    /// Returns whether the patch writes nothing.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty() && self.system.is_empty()
    }

    /// Applies the patch to `metadata`.
    pub fn apply(&self, metadata: &mut Map<String, Value>) {
        for (key, value) in self.attributes.iter().chain(self.system.iter()) {
            metadata.insert(key.clone(), value.clone());
        }
    }
}

/// Read and merge access to users.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Resolves a workspace user by email, case-insensitively.
    async fn find_by_email(&self, workspace_id: Uuid, email: &str) -> Result<Option<UserRecord>>;

    /// Resolves many principals in one query; unknown ids are skipped.
    async fn find_by_ids(&self, workspace_id: Uuid, principal_ids: &[Uuid])
    -> Result<Vec<UserRecord>>;

    /// Merges `patch` into the user's metadata as a single read-modify-write.
    async fn merge_metadata(&self, principal_id: Uuid, patch: &MetadataPatch) -> Result<()>;
}

/// Workspace attribute definitions.
#[async_trait]
pub trait AttributeDefinitionStore: Send + Sync {
    /// Lists the attribute definitions of a workspace.
    async fn list(&self, workspace_id: Uuid) -> Result<Vec<UserAttributeDefinition>>;
}

/// Maps a provider status change onto the linked post.
#[async_trait]
pub trait StatusSync: Send + Sync {
    /// Applies an inbound status change.
    async fn apply(
        &self,
        workspace_id: Uuid,
        integration_type: IntegrationType,
        result: &InboundWebhookResult,
    ) -> Result<()>;
}

/// A failed hook delivery waiting to be retried.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryJob {
    /// Connection to retry against.
    pub connection_id: Uuid,
    /// Owning workspace.
    pub workspace_id: Uuid,
    /// Integration that failed.
    pub integration_type: IntegrationType,
    /// Event to redeliver.
    pub event: DomainEvent,
    /// Attempt number of the failed delivery, starting at 1.
    pub attempt: u32,
    /// Failure reason.
    pub reason: String,
    /// When the job was queued.
    pub enqueued_at: Timestamp,
}

/// Retry and backoff for transient hook failures.
#[async_trait]
pub trait RetryQueue: Send + Sync {
    /// Schedules a redelivery.
    async fn enqueue(&self, job: RetryJob) -> Result<()>;
}

#[cfg(test)]
pub(crate) mod tests {
    use murmur_core::Error;
    use serde_json::json;

    use super::*;

    /// Connection store whose backend is down.
    pub struct UnavailableConnections;

    fn unavailable<T>() -> Result<T> {
        Err(Error::service_unavailable().with_message("connection store is down"))
    }

    #[async_trait]
    impl ConnectionStore for UnavailableConnections {
        async fn find(
            &self,
            _workspace_id: Uuid,
            _integration_type: IntegrationType,
        ) -> Result<Option<IntegrationConnection>> {
            unavailable()
        }

        async fn list_active(&self, _workspace_id: Uuid) -> Result<Vec<IntegrationConnection>> {
            unavailable()
        }

        async fn list_active_by_type(
            &self,
            _integration_type: IntegrationType,
        ) -> Result<Vec<IntegrationConnection>> {
            unavailable()
        }

        async fn upsert(&self, _connection: IntegrationConnection) -> Result<IntegrationConnection> {
            unavailable()
        }

        async fn mark_error(&self, _connection_id: Uuid, _message: &str) -> Result<()> {
            unavailable()
        }

        async fn delete(&self, _connection_id: Uuid) -> Result<bool> {
            unavailable()
        }
    }

    #[test]
    fn test_patch_apply_overwrites_and_keeps() {
        let mut metadata = json!({ "plan": "Free", "company": "Acme" })
            .as_object()
            .cloned()
            .unwrap();
        let patch = MetadataPatch {
            attributes: json!({ "plan": "Pro" }).as_object().cloned().unwrap(),
            system: json!({ "segmentUserId": "u-1" }).as_object().cloned().unwrap(),
        };

        patch.apply(&mut metadata);
        assert_eq!(
            Value::Object(metadata),
            json!({ "plan": "Pro", "company": "Acme", "segmentUserId": "u-1" })
        );
    }
}
