//! Wiring of every hub component around one registry and one set of stores.

use std::sync::Arc;

use murmur_core::Result;
use murmur_core::crypto::SecretsCodec;

use crate::hook::HookDispatcher;
use crate::inbound::InboundGateway;
use crate::oauth::{OAuthManager, StateSigner};
use crate::registry::{CatalogEntry, IntegrationRegistry};
use crate::store::{
    AttributeDefinitionStore, ConnectionStore, MemoryStore, PlatformCredentialStore, RetryQueue,
    StatusSync, UserStore,
};
use crate::sync::UserSyncOrchestrator;

/// External collaborators the hub depends on.
#[derive(Clone)]
pub struct HubStores {
    pub connections: Arc<dyn ConnectionStore>,
    pub credentials: Arc<dyn PlatformCredentialStore>,
    pub users: Arc<dyn UserStore>,
    pub attributes: Arc<dyn AttributeDefinitionStore>,
    pub status_sync: Arc<dyn StatusSync>,
    pub retry_queue: Arc<dyn RetryQueue>,
}

impl HubStores {
    /// Backs every collaborator with one in-memory store.
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            connections: store.clone(),
            credentials: store.clone(),
            users: store.clone(),
            attributes: store.clone(),
            status_sync: store.clone(),
            retry_queue: store,
        }
    }
}

/// The integration hub.
#[derive(Clone)]
pub struct IntegrationHub {
    registry: Arc<IntegrationRegistry>,
    credentials: Arc<dyn PlatformCredentialStore>,
    oauth: OAuthManager,
    dispatcher: HookDispatcher,
    gateway: InboundGateway,
    user_sync: UserSyncOrchestrator,
}

impl IntegrationHub {
    /// Assembles the hub.
    pub fn new(
        registry: IntegrationRegistry,
        codec: SecretsCodec,
        signer: StateSigner,
        stores: HubStores,
    ) -> Self {
        let registry = Arc::new(registry);

        let oauth = OAuthManager::new(
            registry.clone(),
            Arc::new(signer),
            codec.clone(),
            stores.connections.clone(),
            stores.credentials.clone(),
        );
        let dispatcher = HookDispatcher::new(
            registry.clone(),
            codec.clone(),
            stores.connections.clone(),
            stores.retry_queue,
        );
        let gateway = InboundGateway::new(
            registry.clone(),
            codec.clone(),
            stores.connections.clone(),
            stores.status_sync,
        );
        let user_sync = UserSyncOrchestrator::new(
            registry.clone(),
            codec,
            stores.connections,
            stores.users,
            stores.attributes,
        );

        Self {
            registry,
            credentials: stores.credentials,
            oauth,
            dispatcher,
            gateway,
            user_sync,
        }
    }

    /// Returns the registry.
    pub fn registry(&self) -> &IntegrationRegistry {
        &self.registry
    }

    /// Returns the OAuth connection manager.
    pub fn oauth(&self) -> &OAuthManager {
        &self.oauth
    }

    /// Returns the hook dispatcher.
    pub fn dispatcher(&self) -> &HookDispatcher {
        &self.dispatcher
    }

    /// Returns the inbound webhook gateway.
    pub fn gateway(&self) -> &InboundGateway {
        &self.gateway
    }

    /// Returns the user-sync orchestrator.
    pub fn user_sync(&self) -> &UserSyncOrchestrator {
        &self.user_sync
    }

    /// Lists the catalog with availability from the configured credentials.
    pub async fn catalog(&self) -> Result<Vec<CatalogEntry>> {
        let configured = self.credentials.configured_types().await?;
        Ok(self.registry.list_catalog(&configured))
    }
}

#[cfg(test)]
mod tests {
    use murmur_core::crypto::EncryptionKey;

    use super::*;
    use crate::capability::PlatformCredentials;
    use crate::definition::IntegrationType;
    use crate::oauth::DEFAULT_STATE_TTL;
    use crate::providers::tests::test_registry;

    #[tokio::test]
    async fn test_catalog_reflects_configured_credentials() {
        let store = Arc::new(MemoryStore::new());
        let hub = IntegrationHub::new(
            test_registry("http://localhost"),
            SecretsCodec::new(EncryptionKey::generate()),
            StateSigner::new(b"secret", DEFAULT_STATE_TTL),
            HubStores::in_memory(store.clone()),
        );

        let available = |catalog: &[CatalogEntry], integration_type| {
            catalog
                .iter()
                .find(|entry| entry.integration_type == integration_type)
                .map(|entry| entry.available)
        };

        let catalog = hub.catalog().await.unwrap();
        assert_eq!(available(&catalog, IntegrationType::Slack), Some(false));
        assert_eq!(available(&catalog, IntegrationType::Zapier), Some(true));

        store
            .set_platform_credentials(IntegrationType::Slack, PlatformCredentials::default())
            .await;
        let catalog = hub.catalog().await.unwrap();
        assert_eq!(available(&catalog, IntegrationType::Slack), Some(true));
    }
}
