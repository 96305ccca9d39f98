use murmur_integration::{ConfigMap, SecretMap};
use serde::Deserialize;
use uuid::Uuid;

/// Body of `PUT /workspaces/{workspace_id}/integrations/{integration_type}`.
#[must_use]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualConnection {
    /// Admin entering the credentials.
    pub member_id: Uuid,
    /// Plain provider settings.
    #[serde(default)]
    pub config: ConfigMap,
    /// Credentials to seal, e.g. `apiToken` or `webhookSecret`.
    #[serde(default)]
    pub secrets: SecretMap,
}

/// Body of `PATCH /workspaces/{workspace_id}/integrations/{integration_type}/secrets`.
#[must_use]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecretsUpdate {
    /// Secrets merged into the stored ones, e.g. `webhookSecret`.
    pub secrets: SecretMap,
}
