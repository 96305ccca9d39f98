//! Verify, parse and forward inbound status-change webhooks.

use std::sync::Arc;

use murmur_core::crypto::SecretsCodec;
use murmur_webhook::{InboundRequest, InboundResponse};
use uuid::Uuid;

use super::TRACING_TARGET;
use crate::registry::IntegrationRegistry;
use crate::store::{ConnectionStore, StatusSync, resolve_active};

/// Entry point for `POST /api/integrations/{type}/webhook`.
#[derive(Clone)]
pub struct InboundGateway {
    registry: Arc<IntegrationRegistry>,
    codec: SecretsCodec,
    connections: Arc<dyn ConnectionStore>,
    status_sync: Arc<dyn StatusSync>,
}

impl InboundGateway {
    /// Creates a new gateway.
    pub fn new(
        registry: Arc<IntegrationRegistry>,
        codec: SecretsCodec,
        connections: Arc<dyn ConnectionStore>,
        status_sync: Arc<dyn StatusSync>,
    ) -> Self {
        Self {
            registry,
            codec,
            connections,
            status_sync,
        }
    }

    /// Handles one delivery and returns the response for the provider.
    ///
    /// Once the signature has been verified the delivery is acknowledged,
    /// even when the status-sync collaborator fails afterwards.
    #[tracing::instrument(skip_all, fields(integration_type = type_name))]
    pub async fn handle(
        &self,
        type_name: &str,
        workspace_id: Option<Uuid>,
        request: InboundRequest,
    ) -> InboundResponse {
        let Some(definition) = self.registry.get_by_name(type_name) else {
            return InboundResponse::not_found("unknown integration");
        };
        let Some(inbound) = definition.inbound.as_ref() else {
            return InboundResponse::not_found("integration does not accept webhooks");
        };

        let connection =
            match resolve_active(self.connections.as_ref(), definition.id, workspace_id).await {
                Ok(Some(connection)) => connection,
                Ok(None) => return InboundResponse::not_found("integration is not connected"),
                Err(error) => {
                    tracing::error!(
                        target: TRACING_TARGET,
                        error = %error,
                        "Failed to resolve connection"
                    );
                    return InboundResponse::service_unavailable("connection lookup failed");
                }
            };

        let secrets = match self.codec.open(connection.workspace_id, &connection.secrets) {
            Ok(secrets) => secrets,
            Err(error) => {
                tracing::error!(
                    target: TRACING_TARGET,
                    connection_id = %connection.id,
                    error = %error,
                    "Cannot open connection secrets"
                );
                return InboundResponse::not_found("integration is not configured");
            }
        };

        let Some(secret) = inbound.webhook_secret(&secrets) else {
            return InboundResponse::not_found("integration is not configured");
        };

        if let Err(response) = inbound.verify_signature(&request, secret) {
            tracing::warn!(
                target: TRACING_TARGET,
                connection_id = %connection.id,
                status = response.status.as_u16(),
                "Rejected inbound webhook"
            );
            return response;
        }

        let payload = match request.json() {
            Ok(payload) => payload,
            Err(error) => {
                tracing::debug!(target: TRACING_TARGET, error = %error, "Malformed webhook body");
                return InboundResponse::bad_request("body is not valid JSON");
            }
        };

        let Some(result) = inbound.parse_status_change(&payload, &connection.config) else {
            tracing::debug!(
                target: TRACING_TARGET,
                connection_id = %connection.id,
                "Webhook carried no status change"
            );
            return InboundResponse::ignored("no status change");
        };

        tracing::info!(
            target: TRACING_TARGET,
            connection_id = %connection.id,
            external_id = %result.external_id,
            external_status = %result.external_status,
            "Inbound status change"
        );

        if let Err(error) = self
            .status_sync
            .apply(connection.workspace_id, definition.id, &result)
            .await
        {
            tracing::error!(
                target: TRACING_TARGET,
                connection_id = %connection.id,
                external_id = %result.external_id,
                error = %error,
                "Status sync failed after acknowledgement"
            );
        }

        InboundResponse::acknowledged()
    }
}

#[cfg(test)]
mod tests {
    use murmur_core::crypto::EncryptionKey;
    use murmur_webhook::SignatureScheme;
    use reqwest::StatusCode;
    use reqwest::header::{HeaderMap, HeaderValue};
    use serde_json::json;

    use super::*;
    use crate::connection::{ConfigMap, IntegrationConnection, SecretMap};
    use crate::definition::IntegrationType;
    use crate::providers::tests::test_registry;
    use crate::store::MemoryStore;
    use crate::store::tests::UnavailableConnections;

    const SECRET: &str = "whsec";

    struct Fixture {
        gateway: InboundGateway,
        store: Arc<MemoryStore>,
        codec: SecretsCodec,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let codec = SecretsCodec::new(EncryptionKey::generate());
        let gateway = InboundGateway::new(
            Arc::new(test_registry("http://localhost")),
            codec.clone(),
            store.clone(),
            store.clone(),
        );
        Fixture {
            gateway,
            store,
            codec,
        }
    }

    impl Fixture {
        async fn connect(&self, workspace_id: Uuid, secrets: SecretMap) {
            let sealed = self.codec.seal(workspace_id, &secrets).unwrap();
            self.store
                .upsert(IntegrationConnection::new(
                    workspace_id,
                    IntegrationType::Github,
                    None,
                    ConfigMap::new(),
                    sealed,
                ))
                .await
                .unwrap();
        }
    }

    fn with_secret() -> SecretMap {
        let mut secrets = SecretMap::new();
        secrets.insert("webhookSecret".into(), SECRET.into());
        secrets
    }

    fn signed(body: &[u8]) -> InboundRequest {
        let signature = SignatureScheme::PrefixedSha256.sign(SECRET.as_bytes(), body);
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-hub-signature-256",
            HeaderValue::from_str(&signature).unwrap(),
        );
        InboundRequest::new(headers, body.to_vec())
    }

    fn issue(action: &str) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "action": action,
            "issue": { "number": 42 },
            "repository": { "full_name": "acme/feedback" },
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_closed_issue_is_forwarded() {
        let fixture = fixture();
        let workspace_id = Uuid::new_v4();
        fixture.connect(workspace_id, with_secret()).await;

        let response = fixture
            .gateway
            .handle("github", None, signed(&issue("closed")))
            .await;

        assert_eq!(response.status, StatusCode::OK);
        let updates = fixture.store.status_updates().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].workspace_id, workspace_id);
        assert_eq!(updates[0].result.external_id, "acme/feedback#42");
        assert_eq!(updates[0].result.external_status, "Closed");
    }

    #[tokio::test]
    async fn test_replayed_delivery_yields_same_result() {
        let fixture = fixture();
        fixture.connect(Uuid::new_v4(), with_secret()).await;
        let request = signed(&issue("reopened"));

        fixture.gateway.handle("github", None, request.clone()).await;
        fixture.gateway.handle("github", None, request).await;

        let updates = fixture.store.status_updates().await;
        assert_eq!(updates.len(), 2);
        assert_eq!(updates[0].result, updates[1].result);
        assert_eq!(updates[0].result.external_status, "Open");
    }

    #[tokio::test]
    async fn test_bad_signature_is_returned_verbatim() {
        let fixture = fixture();
        fixture.connect(Uuid::new_v4(), with_secret()).await;

        let mut request = signed(&issue("closed"));
        request.body = issue("reopened").into();
        let response = fixture.gateway.handle("github", None, request).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);

        let unsigned = InboundRequest::new(HeaderMap::new(), issue("closed"));
        let response = fixture.gateway.handle("github", None, unsigned).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert!(fixture.store.status_updates().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_or_unconfigured_is_not_found() {
        let fixture = fixture();

        let response = fixture.gateway.handle("jira", None, signed(b"{}")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        let response = fixture.gateway.handle("slack", None, signed(b"{}")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        let response = fixture.gateway.handle("github", None, signed(b"{}")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        fixture.connect(Uuid::new_v4(), SecretMap::new()).await;
        let response = fixture.gateway.handle("github", None, signed(b"{}")).await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_store_outage_asks_for_redelivery() {
        let store = Arc::new(MemoryStore::new());
        let gateway = InboundGateway::new(
            Arc::new(test_registry("http://localhost")),
            SecretsCodec::new(EncryptionKey::generate()),
            Arc::new(UnavailableConnections),
            store.clone(),
        );

        let body = issue("closed");
        let response = gateway
            .handle("github", Some(Uuid::new_v4()), signed(&body))
            .await;

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(store.status_updates().await.is_empty());
    }

    #[tokio::test]
    async fn test_ambiguous_connection_requires_workspace() {
        let fixture = fixture();
        let workspace_id = Uuid::new_v4();
        fixture.connect(workspace_id, with_secret()).await;
        fixture.connect(Uuid::new_v4(), with_secret()).await;

        let response = fixture
            .gateway
            .handle("github", None, signed(&issue("closed")))
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        let response = fixture
            .gateway
            .handle("github", Some(workspace_id), signed(&issue("closed")))
            .await;
        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_malformed_and_irrelevant_bodies() {
        let fixture = fixture();
        fixture.connect(Uuid::new_v4(), with_secret()).await;

        let response = fixture.gateway.handle("github", None, signed(b"not json")).await;
        assert_eq!(response.status, StatusCode::BAD_REQUEST);

        let response = fixture
            .gateway
            .handle("github", None, signed(&issue("labeled")))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert!(fixture.store.status_updates().await.is_empty());
    }
}
