//! Inbound identify merging and outbound segment membership pushes.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use murmur_core::Result;
use murmur_core::crypto::SecretsCodec;
use murmur_webhook::{InboundRequest, InboundResponse};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::TRACING_TARGET;
use super::attributes::map_attributes;
use crate::capability::{IdentifyOutcome, SegmentSyncCapability, SyncUser, UserIdentifyPayload};
use crate::connection::IntegrationConnection;
use crate::definition::IntegrationType;
use crate::registry::IntegrationRegistry;
use crate::store::{
    AttributeDefinitionStore, ConnectionStore, MetadataPatch, UserRecord, UserStore,
    resolve_active,
};

/// Result of one membership push to one connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentSyncOutcome {
    /// Connection pushed to.
    pub connection_id: Uuid,
    /// Integration of that connection.
    pub integration_type: IntegrationType,
    /// `true` for joins, `false` for departures.
    pub joined: bool,
    /// Users in the push.
    pub users: usize,
    /// Failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregate of an outbound sync pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    /// Whether the pass had nothing to do.
    pub skipped: bool,
    /// Per-connection, per-direction outcomes.
    pub outcomes: Vec<SegmentSyncOutcome>,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            outcomes: Vec::new(),
        }
    }

    /// Returns the number of failed pushes.
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| o.error.is_some()).count()
    }
}

/// Coordinates user sync between the user table and CDP integrations.
#[derive(Clone)]
pub struct UserSyncOrchestrator {
    registry: Arc<IntegrationRegistry>,
    codec: SecretsCodec,
    connections: Arc<dyn ConnectionStore>,
    users: Arc<dyn UserStore>,
    attributes: Arc<dyn AttributeDefinitionStore>,
}

impl UserSyncOrchestrator {
    /// Creates a new orchestrator.
    pub fn new(
        registry: Arc<IntegrationRegistry>,
        codec: SecretsCodec,
        connections: Arc<dyn ConnectionStore>,
        users: Arc<dyn UserStore>,
        attributes: Arc<dyn AttributeDefinitionStore>,
    ) -> Self {
        Self {
            registry,
            codec,
            connections,
            users,
            attributes,
        }
    }

    /// Handles `POST /api/integrations/{type}/identify`.
    ///
    /// Failures after the payload is accepted are logged and the delivery is
    /// still acknowledged.
    #[tracing::instrument(skip_all, fields(integration_type = type_name))]
    pub async fn handle_inbound_identify(
        &self,
        type_name: &str,
        workspace_id: Option<Uuid>,
        request: InboundRequest,
    ) -> InboundResponse {
        let Some(definition) = self.registry.get_by_name(type_name) else {
            return InboundResponse::not_found("unknown integration");
        };
        let Some(identify) = definition.identify() else {
            return InboundResponse::not_found("integration does not accept identify calls");
        };

        let connection =
            match resolve_active(self.connections.as_ref(), definition.id, workspace_id).await {
                Ok(Some(connection)) => connection,
                Ok(None) => return InboundResponse::not_found("integration is not connected"),
                Err(error) => {
                    tracing::error!(target: TRACING_TARGET, error = %error, "Failed to resolve connection");
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

        let payload = match identify
            .handle_identify(&request, &connection.config, &secrets)
            .await
        {
            IdentifyOutcome::Respond(response) => return response,
            IdentifyOutcome::Payload(payload) => payload,
        };

        if let Err(error) = self.merge(&connection, payload).await {
            tracing::error!(
                target: TRACING_TARGET,
                connection_id = %connection.id,
                error = %error,
                "Identify processing failed after acknowledgement"
            );
        }

        InboundResponse::acknowledged()
    }

    /// Writes the mapped attributes and correlation id in one merge.
    async fn merge(
        &self,
        connection: &IntegrationConnection,
        payload: UserIdentifyPayload,
    ) -> Result<()> {
        let workspace_id = connection.workspace_id;
        let Some(user) = self.users.find_by_email(workspace_id, &payload.email).await? else {
            tracing::debug!(
                target: TRACING_TARGET,
                connection_id = %connection.id,
                "No user matches identify email"
            );
            return Ok(());
        };

        let definitions = self.attributes.list(workspace_id).await?;
        let mut patch = MetadataPatch {
            attributes: map_attributes(&payload.attributes, &definitions),
            ..MetadataPatch::default()
        };
        if let Some(external_user_id) = payload.external_user_id {
            patch.system.insert(
                connection.integration_type.user_id_field(),
                Value::String(external_user_id),
            );
        }

        if patch.is_empty() {
            return Ok(());
        }

        self.users.merge_metadata(user.principal_id, &patch).await?;

        tracing::debug!(
            target: TRACING_TARGET,
            principal_id = %user.principal_id,
            attributes = patch.attributes.len(),
            "Merged identify attributes"
        );

        Ok(())
    }

    /// Pushes a segment membership delta to every capable connection of
    /// the workspace and waits for all of them.
    #[tracing::instrument(skip_all, fields(workspace_id = %workspace_id, segment = segment))]
    pub async fn notify_user_sync_integrations(
        &self,
        workspace_id: Uuid,
        segment: &str,
        added: &[Uuid],
        removed: &[Uuid],
    ) -> Result<SyncReport> {
        if added.is_empty() && removed.is_empty() {
            return Ok(SyncReport::skipped());
        }

        let targets: Vec<_> = self
            .connections
            .list_active(workspace_id)
            .await?
            .into_iter()
            .filter_map(|connection| {
                let sync = self
                    .registry
                    .get(connection.integration_type)?
                    .segment_sync()?
                    .clone();
                Some((connection, sync))
            })
            .collect();

        if targets.is_empty() {
            tracing::debug!(target: TRACING_TARGET, "No segment sync integration connected");
            return Ok(SyncReport::skipped());
        }

        let ids: Vec<Uuid> = added.iter().chain(removed).copied().collect();
        let records: HashMap<Uuid, UserRecord> = self
            .users
            .find_by_ids(workspace_id, &ids)
            .await?
            .into_iter()
            .map(|record| (record.principal_id, record))
            .collect();

        let pushes = targets.iter().map(|(connection, sync)| {
            self.push(connection, sync.as_ref(), segment, added, removed, &records)
        });

        let outcomes: Vec<_> = join_all(pushes).await.into_iter().flatten().collect();
        let report = SyncReport {
            skipped: false,
            outcomes,
        };

        tracing::info!(
            target: TRACING_TARGET,
            connections = targets.len(),
            added = added.len(),
            removed = removed.len(),
            failures = report.failures(),
            "Segment membership synced"
        );

        Ok(report)
    }

    /// Pushes joins and departures to one connection concurrently.
    async fn push(
        &self,
        connection: &IntegrationConnection,
        sync: &dyn SegmentSyncCapability,
        segment: &str,
        added: &[Uuid],
        removed: &[Uuid],
        records: &HashMap<Uuid, UserRecord>,
    ) -> Vec<SegmentSyncOutcome> {
        let field = connection.integration_type.user_id_field();
        let resolve = |ids: &[Uuid]| -> Vec<SyncUser> {
            ids.iter()
                .filter_map(|id| records.get(id))
                .map(|record| SyncUser {
                    principal_id: record.principal_id,
                    email: record.email.clone(),
                    external_user_id: record
                        .metadata
                        .get(&field)
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                })
                .collect()
        };

        let batches: Vec<(bool, Vec<SyncUser>)> = [(true, resolve(added)), (false, resolve(removed))]
            .into_iter()
            .filter(|(_, users)| !users.is_empty())
            .collect();

        let secrets = match self.codec.open(connection.workspace_id, &connection.secrets) {
            Ok(secrets) => secrets,
            Err(error) => {
                return batches
                    .into_iter()
                    .map(|(joined, users)| SegmentSyncOutcome {
                        connection_id: connection.id,
                        integration_type: connection.integration_type,
                        joined,
                        users: users.len(),
                        error: Some(format!("cannot open secrets: {error}")),
                    })
                    .collect();
            }
        };

        let secrets = &secrets;
        let calls = batches.iter().map(|(joined, users)| async move {
            let result = sync
                .sync_segment_membership(users, segment, *joined, &connection.config, secrets)
                .await;

            if let Err(error) = &result {
                tracing::warn!(
                    target: TRACING_TARGET,
                    connection_id = %connection.id,
                    integration_type = %connection.integration_type,
                    joined = *joined,
                    error = %error,
                    "Segment sync failed"
                );
            }

            SegmentSyncOutcome {
                connection_id: connection.id,
                integration_type: connection.integration_type,
                joined: *joined,
                users: users.len(),
                error: result.err().map(|error| error.to_string()),
            }
        });

        join_all(calls).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use murmur_core::Error;
    use murmur_core::crypto::EncryptionKey;
    use murmur_webhook::SignatureScheme;
    use reqwest::StatusCode;
    use reqwest::header::{HeaderMap, HeaderValue};
    use serde_json::json;

    use super::*;
    use crate::connection::{ConfigMap, SecretMap};
    use crate::definition::{
        CatalogInfo, IntegrationAuthType, IntegrationCategory, IntegrationDefinition, UserSync,
    };
    use crate::providers::tests::test_registry;
    use crate::store::MemoryStore;
    use crate::store::tests::UnavailableConnections;
    use crate::sync::{AttributeType, BatchReport, UserAttributeDefinition};

    const SECRET: &str = "segment-secret";

    type Calls = Arc<Mutex<Vec<(bool, Vec<SyncUser>)>>>;

    struct RecordingSync {
        calls: Calls,
        fail_departures: bool,
    }

    #[async_trait]
    impl SegmentSyncCapability for RecordingSync {
        async fn sync_segment_membership(
            &self,
            users: &[SyncUser],
            _: &str,
            joined: bool,
            _: &ConfigMap,
            _: &SecretMap,
        ) -> Result<BatchReport> {
            self.calls.lock().unwrap().push((joined, users.to_vec()));
            if self.fail_departures && !joined {
                return Err(Error::external_error().with_message("1 of 1 identify calls failed"));
            }
            Ok(BatchReport {
                total: users.len(),
                succeeded: users.len(),
                ..BatchReport::default()
            })
        }
    }

    struct Fixture {
        orchestrator: UserSyncOrchestrator,
        store: Arc<MemoryStore>,
        codec: SecretsCodec,
        workspace_id: Uuid,
    }

    fn fixture_with(registry: IntegrationRegistry) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let codec = SecretsCodec::new(EncryptionKey::generate());
        let orchestrator = UserSyncOrchestrator::new(
            Arc::new(registry),
            codec.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        );
        Fixture {
            orchestrator,
            store,
            codec,
            workspace_id: Uuid::new_v4(),
        }
    }

    fn recording_registry(fail_departures: bool) -> (IntegrationRegistry, Calls) {
        let calls = Calls::default();
        let definition = IntegrationDefinition::new(
            IntegrationType::Segment,
            CatalogInfo {
                name: "Segment",
                description: "Recording",
                category: IntegrationCategory::CustomerData,
                auth_type: IntegrationAuthType::ApiKey,
            },
        )
        .with_user_sync(UserSync {
            identify: None,
            segment_sync: Some(Arc::new(RecordingSync {
                calls: calls.clone(),
                fail_departures,
            })),
        });
        (IntegrationRegistry::new([definition]), calls)
    }

    impl Fixture {
        async fn connect_segment(&self) {
            let mut secrets = SecretMap::new();
            secrets.insert("webhookSecret".into(), SECRET.into());
            secrets.insert("writeKey".into(), "wk".into());
            let sealed = self.codec.seal(self.workspace_id, &secrets).unwrap();
            self.store
                .upsert(IntegrationConnection::new(
                    self.workspace_id,
                    IntegrationType::Segment,
                    None,
                    ConfigMap::new(),
                    sealed,
                ))
                .await
                .unwrap();
        }

        async fn define_plan(&self) {
            self.store
                .set_attribute_definitions(
                    self.workspace_id,
                    vec![
                        UserAttributeDefinition::new("plan", "plan", AttributeType::String),
                        UserAttributeDefinition::new("mrr", "monthlyRevenue", AttributeType::Currency),
                    ],
                )
                .await;
        }
    }

    fn identify(body: Value) -> InboundRequest {
        let body = serde_json::to_vec(&body).unwrap();
        let signature = SignatureScheme::Base64Sha1.sign(SECRET.as_bytes(), &body);
        let mut headers = HeaderMap::new();
        headers.insert("x-signature", HeaderValue::from_str(&signature).unwrap());
        InboundRequest::new(headers, body)
    }

    #[tokio::test]
    async fn test_identify_merges_defined_attributes() {
        let fixture = fixture_with(test_registry("http://localhost"));
        fixture.connect_segment().await;
        fixture.define_plan().await;
        let user = fixture
            .store
            .insert_user(fixture.workspace_id, "ada@example.com")
            .await;

        let response = fixture
            .orchestrator
            .handle_inbound_identify(
                "segment",
                None,
                identify(json!({
                    "type": "identify",
                    "userId": "seg-1",
                    "traits": { "email": "ada@example.com", "plan": "Pro", "mrr": "49.999", "shoeSize": 9 },
                })),
            )
            .await;

        assert_eq!(response.status, StatusCode::OK);
        let metadata = fixture.store.user(user).await.unwrap().metadata;
        assert_eq!(
            Value::Object(metadata),
            json!({ "plan": "Pro", "monthlyRevenue": 50.0, "segmentUserId": "seg-1" })
        );
    }

    #[tokio::test]
    async fn test_identify_for_unknown_email_writes_nothing() {
        let fixture = fixture_with(test_registry("http://localhost"));
        fixture.connect_segment().await;
        fixture.define_plan().await;
        let other = fixture
            .store
            .insert_user(fixture.workspace_id, "grace@example.com")
            .await;

        let response = fixture
            .orchestrator
            .handle_inbound_identify(
                "segment",
                None,
                identify(json!({
                    "type": "identify",
                    "userId": "seg-2",
                    "traits": { "email": "nobody@example.com", "plan": "Pro" },
                })),
            )
            .await;

        assert_eq!(response.status, StatusCode::OK);
        assert!(fixture.store.user(other).await.unwrap().metadata.is_empty());
    }

    #[tokio::test]
    async fn test_identify_store_failure_still_acknowledges() {
        let fixture = fixture_with(test_registry("http://localhost"));
        fixture.connect_segment().await;
        fixture.define_plan().await;
        fixture
            .store
            .insert_user(fixture.workspace_id, "ada@example.com")
            .await;
        fixture.store.set_fail_user_writes(true).await;

        let response = fixture
            .orchestrator
            .handle_inbound_identify(
                "segment",
                None,
                identify(json!({
                    "type": "identify",
                    "traits": { "email": "ada@example.com", "plan": "Pro" },
                })),
            )
            .await;

        assert_eq!(response.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_identify_store_outage_asks_for_redelivery() {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = UserSyncOrchestrator::new(
            Arc::new(test_registry("http://localhost")),
            SecretsCodec::new(EncryptionKey::generate()),
            Arc::new(UnavailableConnections),
            store.clone(),
            store.clone(),
        );

        let response = orchestrator
            .handle_inbound_identify(
                "segment",
                Some(Uuid::new_v4()),
                identify(json!({ "type": "identify", "traits": { "email": "ada@example.com" } })),
            )
            .await;

        assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_identify_short_circuits() {
        let fixture = fixture_with(test_registry("http://localhost"));

        let response = fixture
            .orchestrator
            .handle_inbound_identify("github", None, identify(json!({})))
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);

        fixture.connect_segment().await;
        let mut request = identify(json!({ "type": "identify" }));
        request.headers.remove("x-signature");
        let response = fixture
            .orchestrator
            .handle_inbound_identify("segment", None, request)
            .await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_notify_skips_without_work() {
        let (registry, calls) = recording_registry(false);
        let fixture = fixture_with(registry);
        let user = fixture
            .store
            .insert_user(fixture.workspace_id, "ada@example.com")
            .await;

        let report = fixture
            .orchestrator
            .notify_user_sync_integrations(fixture.workspace_id, "vip", &[user], &[])
            .await
            .unwrap();
        assert!(report.skipped);

        fixture.connect_segment().await;
        let report = fixture
            .orchestrator
            .notify_user_sync_integrations(fixture.workspace_id, "vip", &[], &[])
            .await
            .unwrap();
        assert!(report.skipped);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notify_pushes_both_directions() {
        let (registry, calls) = recording_registry(true);
        let fixture = fixture_with(registry);
        fixture.connect_segment().await;

        let ada = fixture
            .store
            .insert_user(fixture.workspace_id, "ada@example.com")
            .await;
        let grace = fixture
            .store
            .insert_user(fixture.workspace_id, "grace@example.com")
            .await;
        let patch = MetadataPatch {
            system: json!({ "segmentUserId": "seg-ada" }).as_object().cloned().unwrap(),
            ..MetadataPatch::default()
        };
        fixture.store.merge_metadata(ada, &patch).await.unwrap();

        let report = fixture
            .orchestrator
            .notify_user_sync_integrations(
                fixture.workspace_id,
                "vip",
                &[ada, Uuid::new_v4()],
                &[grace],
            )
            .await
            .unwrap();

        assert!(!report.skipped);
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.failures(), 1);

        let joined = report.outcomes.iter().find(|o| o.joined).unwrap();
        assert_eq!(joined.users, 1);
        assert!(joined.error.is_none());

        let calls = calls.lock().unwrap();
        let (_, joined_users) = calls.iter().find(|(joined, _)| *joined).unwrap();
        assert_eq!(joined_users[0].external_user_id.as_deref(), Some("seg-ada"));
    }
}
