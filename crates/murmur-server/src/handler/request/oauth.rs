use std::collections::BTreeMap;

use murmur_integration::ConfigMap;
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

/// Query of `GET /oauth/{integration_type}/connect`.
#[must_use]
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectQuery {
    /// Workspace being connected.
    pub workspace_id: Uuid,
    /// Admin starting the flow.
    pub member_id: Uuid,
    /// Provider settings chosen before consent, e.g. `channelId`.
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
}

impl ConnectQuery {
    /// Returns the extra fields as connection config.
    pub fn config(&self) -> ConfigMap {
        self.fields
            .iter()
            .map(|(key, value)| (key.clone(), Value::String(value.clone())))
            .collect()
    }
}

/// Query of `GET /oauth/{integration_type}/callback`.
#[must_use]
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackQuery {
    /// Authorization code.
    pub code: Option<String>,
    /// Signed state issued by the connect step.
    pub state: Option<String>,
    /// Provider error, when consent was denied or failed.
    pub error: Option<String>,
    /// Human readable provider error.
    pub error_description: Option<String>,
}
