use jiff::Timestamp;
use murmur_integration::{ConfigMap, ConnectionStatus, IntegrationConnection, IntegrationType};
use serde::Serialize;
use uuid::Uuid;

/// A workspace connection as returned to admins.
///
/// Secrets never leave the store; only the plain provider settings do.
#[must_use]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Connection identifier.
    pub id: Uuid,
    /// Owning workspace.
    pub workspace_id: Uuid,
    /// Connected integration.
    pub integration_type: IntegrationType,
    /// Lifecycle status.
    pub status: ConnectionStatus,
    /// Plain provider settings.
    pub config: ConfigMap,
    /// Member who connected the integration.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_by: Option<Uuid>,
    /// Creation time.
    pub created_at: Timestamp,
    /// Last modification time.
    pub updated_at: Timestamp,
}

impl From<IntegrationConnection> for Connection {
    fn from(connection: IntegrationConnection) -> Self {
        Self {
            id: connection.id,
            workspace_id: connection.workspace_id,
            integration_type: connection.integration_type,
            status: connection.status,
            config: connection.config,
            connected_by: connection.connected_by,
            created_at: connection.created_at,
            updated_at: connection.updated_at,
        }
    }
}
