//! Zapier: forwards every domain event to a catch hook.

use std::sync::Arc;

use async_trait::async_trait;
use murmur_webhook::HookResult;
use murmur_webhook::reqwest::ProviderClient;
use serde_json::json;
use url::Url;

use super::into_hook_result;
use crate::capability::{HookCapability, HookTarget};
use crate::connection::ConfigMap;
use crate::definition::{
    CatalogInfo, IntegrationAuthType, IntegrationCategory, IntegrationDefinition,
    IntegrationType,
};
use crate::event::DomainEvent;

const CATALOG: CatalogInfo = CatalogInfo {
    name: "Zapier",
    description: "Trigger Zaps from feedback activity",
    category: IntegrationCategory::Automation,
    auth_type: IntegrationAuthType::Webhook,
};

/// Zapier catch-hook integration.
#[derive(Debug, Clone)]
pub struct ZapierProvider {
    client: ProviderClient,
}

impl ZapierProvider {
    /// Creates a new provider.
    pub fn new(client: ProviderClient) -> Self {
        Self { client }
    }

    /// Returns the integration definition.
    pub fn definition(self) -> IntegrationDefinition {
        IntegrationDefinition::new(IntegrationType::Zapier, CATALOG).with_hook(Arc::new(self))
    }
}

#[async_trait]
impl HookCapability for ZapierProvider {
    async fn run(&self, event: &DomainEvent, target: &HookTarget, _config: &ConfigMap) -> HookResult {
        let Some(url) = target
            .secret("webhookUrl")
            .and_then(|url| Url::parse(url).ok())
            .filter(|url| matches!(url.scheme(), "https" | "http"))
        else {
            return HookResult::failure("zapier webhook url is missing or invalid", false);
        };

        let request = self.client.http().post(url).json(&json!({
            "event": event.kind(),
            "workspaceId": target.workspace_id,
            "data": event,
        }));

        into_hook_result(self.client.send(request).await, |_| HookResult::ok())
    }
}
