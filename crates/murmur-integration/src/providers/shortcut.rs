//! Shortcut: story creation and workflow state webhooks.

use std::sync::Arc;

use async_trait::async_trait;
use murmur_webhook::reqwest::ProviderClient;
use murmur_webhook::{HookResult, InboundRequest, InboundResponse, SignatureScheme};
use serde_json::{Map, Value, json};

use super::{TRACING_TARGET, endpoint, into_hook_result};
use crate::capability::{HookCapability, HookTarget, InboundCapability, InboundWebhookResult};
use crate::connection::ConfigMap;
use crate::definition::{
    CatalogInfo, IntegrationAuthType, IntegrationCategory, IntegrationDefinition,
    IntegrationType,
};
use crate::event::DomainEvent;

const API_BASE: &str = "https://api.app.shortcut.com";
const TOKEN_HEADER: &str = "Shortcut-Token";

const CATALOG: CatalogInfo = CatalogInfo {
    name: "Shortcut",
    description: "Turn feedback into stories and follow their workflow state",
    category: IntegrationCategory::IssueTracking,
    auth_type: IntegrationAuthType::ApiKey,
};

/// Shortcut API token integration.
#[derive(Debug, Clone)]
pub struct ShortcutProvider {
    client: ProviderClient,
    api_base: String,
}

impl ShortcutProvider {
    /// Creates a provider against the public Shortcut API.
    pub fn new(client: ProviderClient) -> Self {
        Self {
            client,
            api_base: API_BASE.to_owned(),
        }
    }

    /// Overrides the REST API base URL.
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_owned();
        self
    }

    /// Returns the integration definition.
    pub fn definition(self) -> IntegrationDefinition {
        let provider = Arc::new(self);
        IntegrationDefinition::new(IntegrationType::Shortcut, CATALOG)
            .with_hook(provider.clone())
            .with_inbound(provider)
    }
}

#[async_trait]
impl HookCapability for ShortcutProvider {
    async fn run(&self, event: &DomainEvent, target: &HookTarget, config: &ConfigMap) -> HookResult {
        let DomainEvent::PostCreated { post, .. } = event else {
            return HookResult::skipped();
        };
        let Some(token) = target.secret("apiToken") else {
            return HookResult::failure("shortcut api token is missing", false);
        };

        let mut story = Map::new();
        story.insert("name".into(), post.title.clone().into());
        story.insert(
            "description".into(),
            format!(
                "{}\n\n{}",
                post.content.as_deref().unwrap_or_default(),
                post.url
            )
            .into(),
        );
        story.insert("external_links".into(), json!([post.url]));
        for (from, to) in [
            ("projectId", "project_id"),
            ("workflowStateId", "workflow_state_id"),
        ] {
            if let Some(id) = config.get(from).and_then(Value::as_i64) {
                story.insert(to.into(), id.into());
            }
        }

        let request = self
            .client
            .http()
            .post(endpoint(&self.api_base, "api/v3/stories"))
            .header(TOKEN_HEADER, token)
            .json(&story);

        into_hook_result(self.client.send(request).await, |response| {
            match response.body.get("id").and_then(Value::as_i64) {
                Some(id) => HookResult::created(
                    id.to_string(),
                    response
                        .body
                        .get("app_url")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                ),
                None => HookResult::ok(),
            }
        })
    }
}

/// Renders a numeric or string id.
fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Number(number) => Some(number.to_string()),
        Value::String(text) => Some(text.clone()),
        _ => None,
    }
}

impl InboundCapability for ShortcutProvider {
    fn verify_signature(
        &self,
        request: &InboundRequest,
        secret: &str,
    ) -> std::result::Result<(), InboundResponse> {
        SignatureScheme::HexSha256
            .verify(&request.headers, &request.body, secret)
            .map_err(InboundResponse::from)
    }

    /// Finds the first story action that moved workflow state and names the
    /// new state through `config.workflowStates`.
    ///
    /// An id without a mapping is logged and dropped.
    fn parse_status_change(&self, payload: &Value, config: &ConfigMap) -> Option<InboundWebhookResult> {
        let (story_id, state_id) = payload
            .get("actions")?
            .as_array()?
            .iter()
            .filter(|action| {
                action
                    .get("entity_type")
                    .and_then(Value::as_str)
                    .is_none_or(|entity| entity == "story")
            })
            .find_map(|action| {
                let state = action.get("changes")?.get("workflow_state_id")?.get("new")?;
                Some((scalar(action.get("id")?)?, scalar(state)?))
            })?;

        let Some(status) = config
            .get("workflowStates")
            .and_then(|states| states.get(&state_id))
            .and_then(Value::as_str)
        else {
            tracing::warn!(
                target: TRACING_TARGET,
                story_id = %story_id,
                workflow_state_id = %state_id,
                "Unmapped Shortcut workflow state, dropping event"
            );
            return None;
        };

        Some(InboundWebhookResult {
            external_id: story_id,
            external_status: status.to_owned(),
            event_type: "story.update".to_owned(),
        })
    }
}
