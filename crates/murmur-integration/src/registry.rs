//! Static catalog of integration definitions.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::Serialize;

use crate::definition::{
    CredentialField, IntegrationAuthType, IntegrationCategory, IntegrationDefinition,
    IntegrationType,
};

/// Capabilities advertised for a catalog entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityFlags {
    pub oauth: bool,
    pub hook: bool,
    pub inbound: bool,
    pub identify: bool,
    pub segment_sync: bool,
}

/// One integration as presented in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    /// Integration identifier.
    #[serde(rename = "type")]
    pub integration_type: IntegrationType,
    /// Product name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Functional category.
    pub category: IntegrationCategory,
    /// Authentication method.
    pub auth_type: IntegrationAuthType,
    /// Whether workspaces can connect right now.
    pub available: bool,
    /// Whether an admin can supply platform credentials.
    pub configurable: bool,
    /// Platform credential fields, when configurable.
    #[serde(skip_serializing_if = "no_fields")]
    pub credential_fields: &'static [CredentialField],
    /// Capability flags.
    pub capabilities: CapabilityFlags,
}

fn no_fields(fields: &&'static [CredentialField]) -> bool {
    fields.is_empty()
}

/// Immutable registry keyed by integration type.
#[derive(Debug, Clone, Default)]
pub struct IntegrationRegistry {
    definitions: BTreeMap<IntegrationType, IntegrationDefinition>,
}

impl IntegrationRegistry {
    /// Builds a registry from a fixed set of definitions.
    ///
    /// A later definition with the same type replaces an earlier one.
    pub fn new(definitions: impl IntoIterator<Item = IntegrationDefinition>) -> Self {
        let definitions = definitions
            .into_iter()
            .map(|definition| (definition.id, definition))
            .collect();
        Self { definitions }
    }

    /// Looks up a definition.
    pub fn get(&self, integration_type: IntegrationType) -> Option<&IntegrationDefinition> {
        self.definitions.get(&integration_type)
    }

    /// Looks up a definition by its path segment; unknown names are absent.
    pub fn get_by_name(&self, name: &str) -> Option<&IntegrationDefinition> {
        IntegrationType::from_str(name)
            .ok()
            .and_then(|integration_type| self.get(integration_type))
    }

    /// Iterates over all definitions in type order.
    pub fn iter(&self) -> impl Iterator<Item = &IntegrationDefinition> {
        self.definitions.values()
    }

    /// Lists the catalog.
    ///
    /// `configured` holds the types an admin has supplied platform
    /// credentials for; integrations that need none are always available.
    pub fn list_catalog(&self, configured: &[IntegrationType]) -> Vec<CatalogEntry> {
        self.iter()
            .map(|definition| {
                let needs_credentials = definition.platform_credentials.is_some();
                let credential_fields = definition
                    .platform_credentials
                    .map(|spec| spec.fields)
                    .unwrap_or_default();

                CatalogEntry {
                    integration_type: definition.id,
                    name: definition.catalog.name,
                    description: definition.catalog.description,
                    category: definition.catalog.category,
                    auth_type: definition.catalog.auth_type,
                    available: !needs_credentials || configured.contains(&definition.id),
                    configurable: needs_credentials,
                    credential_fields,
                    capabilities: CapabilityFlags {
                        oauth: definition.oauth.is_some(),
                        hook: definition.hook.is_some(),
                        inbound: definition.inbound.is_some(),
                        identify: definition.identify().is_some(),
                        segment_sync: definition.segment_sync().is_some(),
                    },
                }
            })
            .collect()
    }

    /// Types whose user sync can push segment membership.
    pub fn list_types_with_segment_sync(&self) -> Vec<IntegrationType> {
        self.iter()
            .filter(|definition| definition.segment_sync().is_some())
            .map(|definition| definition.id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::tests::test_registry;

    #[test]
    fn test_get_unknown_name_is_absent() {
        let registry = test_registry("http://localhost");
        assert!(registry.get_by_name("jira").is_none());
        assert!(registry.get_by_name("slack").is_some());
    }

    #[test]
    fn test_catalog_availability() {
        let registry = test_registry("http://localhost");

        let catalog = registry.list_catalog(&[]);
        let slack = catalog
            .iter()
            .find(|entry| entry.integration_type == IntegrationType::Slack)
            .unwrap();
        assert!(!slack.available);
        assert!(slack.configurable);
        assert_eq!(slack.credential_fields.len(), 2);

        let zapier = catalog
            .iter()
            .find(|entry| entry.integration_type == IntegrationType::Zapier)
            .unwrap();
        assert!(zapier.available);
        assert!(!zapier.configurable);

        let catalog = registry.list_catalog(&[IntegrationType::Slack]);
        assert!(catalog.iter().all(|entry| entry.available || entry.configurable));
        assert!(
            catalog
                .iter()
                .find(|entry| entry.integration_type == IntegrationType::Slack)
                .unwrap()
                .available
        );
    }

    #[test]
    fn test_list_types_with_segment_sync() {
        let registry = test_registry("http://localhost");
        assert_eq!(
            registry.list_types_with_segment_sync(),
            vec![IntegrationType::Segment]
        );
    }

    #[test]
    fn test_catalog_serialization() {
        let registry = test_registry("http://localhost");
        let value = serde_json::to_value(registry.list_catalog(&[])).unwrap();

        let shortcut = value
            .as_array()
            .unwrap()
            .iter()
            .find(|entry| entry["type"] == "shortcut")
            .unwrap();
        assert_eq!(shortcut["authType"], "api_key");
        assert_eq!(shortcut["capabilities"]["inbound"], true);
        assert!(shortcut.get("credentialFields").is_none());
    }
}
