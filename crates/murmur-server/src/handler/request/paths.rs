use serde::Deserialize;
use uuid::Uuid;

/// `/{integration_type}` segment of provider-facing routes.
///
/// Kept as a string so unknown names reach the hub and become `404`s.
#[must_use]
#[derive(Debug, Clone, Deserialize)]
pub struct IntegrationPathParams {
    /// Integration name, e.g. `github`.
    pub integration_type: String,
}

/// `/workspaces/{workspace_id}` routes.
#[must_use]
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct WorkspacePathParams {
    /// Workspace identifier.
    pub workspace_id: Uuid,
}

/// `/workspaces/{workspace_id}/integrations/{integration_type}` routes.
#[must_use]
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceIntegrationPathParams {
    /// Workspace identifier.
    pub workspace_id: Uuid,
    /// Integration name.
    pub integration_type: String,
}

/// `/workspaces/{workspace_id}/segments/{segment}` routes.
#[must_use]
#[derive(Debug, Clone, Deserialize)]
pub struct WorkspaceSegmentPathParams {
    /// Workspace identifier.
    pub workspace_id: Uuid,
    /// Segment name.
    pub segment: String,
}

/// Optional workspace hint on inbound webhook URLs.
///
/// Without it the connection is resolved only when exactly one workspace has
/// the integration active.
#[must_use]
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundQuery {
    /// Workspace the webhook belongs to.
    pub workspace_id: Option<Uuid>,
}
