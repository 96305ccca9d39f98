//! Persisted workspace connections to an integration.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

use crate::definition::IntegrationType;

/// Non-secret, provider-specific connection settings.
pub type ConfigMap = Map<String, Value>;

pub use murmur_core::crypto::SecretMap;

/// Lifecycle status of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionStatus {
    /// Receiving events.
    #[default]
    Active,
    /// Paused by an admin.
    Disabled,
    /// Flagged after a non-retryable failure; needs reconnection.
    Error,
}

/// A workspace's connection to one integration type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrationConnection {
    /// Connection identifier.
    pub id: Uuid,
    /// Owning workspace.
    pub workspace_id: Uuid,
    /// Integration this connection belongs to.
    pub integration_type: IntegrationType,
    /// Lifecycle status.
    pub status: ConnectionStatus,
    /// Plain provider settings.
    pub config: ConfigMap,
    /// Sealed secrets, opened only for the duration of one call.
    #[serde(skip)]
    pub secrets: Vec<u8>,
    /// Member who created the connection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_by: Option<Uuid>,
    /// Reason the connection was flagged.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

impl IntegrationConnection {
    /// Creates a new active connection.
    pub fn new(
        workspace_id: Uuid,
        integration_type: IntegrationType,
        connected_by: Option<Uuid>,
        config: ConfigMap,
        secrets: Vec<u8>,
    ) -> Self {
        let now = Timestamp::now();
        Self {
            id: Uuid::now_v7(),
            workspace_id,
            integration_type,
            status: ConnectionStatus::Active,
            config,
            secrets,
            connected_by,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns whether the connection should receive traffic.
    pub fn is_active(&self) -> bool {
        self.status == ConnectionStatus::Active
    }

    /// Returns a string config value.
    pub fn config_str(&self, key: &str) -> Option<&str> {
        self.config.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_connection_is_active() {
        let connection = IntegrationConnection::new(
            Uuid::new_v4(),
            IntegrationType::Slack,
            None,
            ConfigMap::new(),
            vec![1, 2, 3],
        );

        assert!(connection.is_active());
        assert_eq!(connection.created_at, connection.updated_at);
    }

    #[test]
    fn test_secrets_never_serialize() {
        let connection = IntegrationConnection::new(
            Uuid::new_v4(),
            IntegrationType::Github,
            None,
            ConfigMap::new(),
            vec![9; 48],
        );

        let value = serde_json::to_value(&connection).unwrap();
        assert!(value.get("secrets").is_none());
        assert_eq!(value["status"], "active");
        assert_eq!(value["integrationType"], "github");
    }
}
