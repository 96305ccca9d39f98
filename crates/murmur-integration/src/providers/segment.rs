//! Segment: identify calls in, audience membership out.

use std::sync::Arc;

use async_trait::async_trait;
use murmur_core::{Error, Result};
use murmur_webhook::reqwest::ProviderClient;
use murmur_webhook::{InboundRequest, InboundResponse, SignatureScheme};
use serde_json::{Map, Value, json};

use super::{TRACING_TARGET, endpoint};
use crate::capability::{
    IdentifyCapability, IdentifyOutcome, SegmentSyncCapability, SyncUser, UserIdentifyPayload,
    WEBHOOK_SECRET_KEY,
};
use crate::connection::{ConfigMap, SecretMap};
use crate::definition::{
    CatalogInfo, IntegrationAuthType, IntegrationCategory, IntegrationDefinition,
    IntegrationType, UserSync,
};
use crate::sync::{BatchReport, DEFAULT_BATCH_SIZE, run_batched};

const API_BASE: &str = "https://api.segment.io";

const CATALOG: CatalogInfo = CatalogInfo {
    name: "Segment",
    description: "Enrich users with CDP traits and sync segment membership back",
    category: IntegrationCategory::CustomerData,
    auth_type: IntegrationAuthType::ApiKey,
};

/// Segment source integration.
#[derive(Debug, Clone)]
pub struct SegmentProvider {
    client: ProviderClient,
    api_base: String,
}

impl SegmentProvider {
    /// Creates a provider against the public Segment tracking API.
    pub fn new(client: ProviderClient) -> Self {
        Self {
            client,
            api_base: API_BASE.to_owned(),
        }
    }

    /// Overrides the tracking API base URL.
    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_owned();
        self
    }

    /// Returns the integration definition.
    pub fn definition(self) -> IntegrationDefinition {
        let provider = Arc::new(self);
        IntegrationDefinition::new(IntegrationType::Segment, CATALOG).with_user_sync(UserSync {
            identify: Some(provider.clone()),
            segment_sync: Some(provider),
        })
    }

    async fn identify_one(
        &self,
        write_key: &str,
        user: &SyncUser,
        segment: &str,
        joined: bool,
    ) -> Result<()> {
        let user_id = user
            .external_user_id
            .clone()
            .unwrap_or_else(|| user.principal_id.to_string());

        let request = self
            .client
            .http()
            .post(endpoint(&self.api_base, "v1/identify"))
            .basic_auth(write_key, None::<&str>)
            .json(&json!({
                "userId": user_id,
                "traits": { "email": user.email, segment: joined },
            }));

        self.client.send(request).await?.error_for_status("segment")?;
        Ok(())
    }
}

#[async_trait]
impl IdentifyCapability for SegmentProvider {
    async fn handle_identify(
        &self,
        request: &InboundRequest,
        _config: &ConfigMap,
        secrets: &SecretMap,
    ) -> IdentifyOutcome {
        let Some(secret) = secrets.get(WEBHOOK_SECRET_KEY).and_then(Value::as_str) else {
            return IdentifyOutcome::Respond(InboundResponse::not_found(
                "integration is not configured",
            ));
        };
        if let Err(error) = SignatureScheme::Base64Sha1.verify(&request.headers, &request.body, secret)
        {
            return IdentifyOutcome::Respond(error.into());
        }

        let Ok(payload) = request.json() else {
            return IdentifyOutcome::Respond(InboundResponse::bad_request("body is not valid JSON"));
        };
        if payload.get("type").and_then(Value::as_str) != Some("identify") {
            return IdentifyOutcome::Respond(InboundResponse::ignored("not an identify call"));
        }

        let traits = payload
            .get("traits")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let email = traits
            .get("email")
            .or_else(|| payload.get("email"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|email| !email.is_empty());

        let Some(email) = email else {
            tracing::debug!(target: TRACING_TARGET, "Identify call without email");
            return IdentifyOutcome::Respond(InboundResponse::ignored("missing email"));
        };

        IdentifyOutcome::Payload(UserIdentifyPayload {
            email: email.to_owned(),
            external_user_id: payload
                .get("userId")
                .and_then(Value::as_str)
                .map(str::to_owned),
            attributes: traits
                .into_iter()
                .filter(|(key, _)| key != "email")
                .collect::<Map<_, _>>(),
        })
    }
}

#[async_trait]
impl SegmentSyncCapability for SegmentProvider {
    async fn sync_segment_membership(
        &self,
        users: &[SyncUser],
        segment: &str,
        joined: bool,
        _config: &ConfigMap,
        secrets: &SecretMap,
    ) -> Result<BatchReport> {
        let write_key = secrets
            .get("writeKey")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::configuration().with_message("segment write key is missing"))?;

        let report = run_batched(users, DEFAULT_BATCH_SIZE, |user| {
            let user = user.clone();
            async move { self.identify_one(write_key, &user, segment, joined).await }
        })
        .await;

        tracing::debug!(
            target: TRACING_TARGET,
            segment,
            joined,
            succeeded = report.succeeded,
            failed = report.failed,
            "Segment membership pushed"
        );

        report.into_result("identify calls")
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderMap, HeaderValue};
    use uuid::Uuid;
    use wiremock::matchers::{basic_auth, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::providers::tests::client;

    fn provider(base: &str) -> SegmentProvider {
        SegmentProvider::new(client()).with_api_base(base)
    }

    fn secrets() -> SecretMap {
        json!({ "webhookSecret": "whsec", "writeKey": "wk" })
            .as_object()
            .cloned()
            .unwrap()
    }

    fn signed(body: Value) -> InboundRequest {
        let body = serde_json::to_vec(&body).unwrap();
        let signature = SignatureScheme::Base64Sha1.sign(b"whsec", &body);
        let mut headers = HeaderMap::new();
        headers.insert("x-signature", HeaderValue::from_str(&signature).unwrap());
        InboundRequest::new(headers, body)
    }

    fn users(count: usize) -> Vec<SyncUser> {
        (0..count)
            .map(|i| SyncUser {
                principal_id: Uuid::now_v7(),
                email: format!("user{i}@example.com"),
                external_user_id: Some(format!("seg-{i}")),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_identify_payload() {
        let outcome = provider("http://localhost")
            .handle_identify(
                &signed(json!({
                    "type": "identify",
                    "userId": "seg-1",
                    "traits": { "email": "ada@example.com", "plan": "Pro" },
                })),
                &ConfigMap::new(),
                &secrets(),
            )
            .await;

        let IdentifyOutcome::Payload(payload) = outcome else {
            panic!("expected payload");
        };
        assert_eq!(payload.email, "ada@example.com");
        assert_eq!(payload.external_user_id.as_deref(), Some("seg-1"));
        assert_eq!(payload.attributes.len(), 1);
    }

    #[tokio::test]
    async fn test_identify_short_circuits() {
        let provider = provider("http://localhost");

        let track = provider
            .handle_identify(&signed(json!({ "type": "track" })), &ConfigMap::new(), &secrets())
            .await;
        assert!(matches!(track, IdentifyOutcome::Respond(r) if r.status.as_u16() == 200));

        let mut forged = signed(json!({ "type": "identify" }));
        forged.body = br#"{"type":"identify","traits":{"email":"eve@example.com"}}"#.to_vec().into();
        let forged = provider
            .handle_identify(&forged, &ConfigMap::new(), &secrets())
            .await;
        assert!(matches!(forged, IdentifyOutcome::Respond(r) if r.status.as_u16() == 401));
    }

    #[tokio::test]
    async fn test_partial_failure_is_aggregated() {
        let server = MockServer::start().await;
        for failing in ["seg-3", "seg-12", "seg-24"] {
            Mock::given(method("POST"))
                .and(path("/v1/identify"))
                .and(body_partial_json(json!({ "userId": failing })))
                .respond_with(ResponseTemplate::new(500))
                .with_priority(1)
                .mount(&server)
                .await;
        }
        Mock::given(method("POST"))
            .and(path("/v1/identify"))
            .and(basic_auth("wk", ""))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .with_priority(2)
            .expect(22)
            .mount(&server)
            .await;

        let error = provider(&server.uri())
            .sync_segment_membership(&users(25), "vip", true, &ConfigMap::new(), &secrets())
            .await
            .unwrap_err();

        assert!(error.to_string().contains("3 of 25 identify calls failed"));
    }

    #[tokio::test]
    async fn test_membership_trait_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/identify"))
            .and(body_partial_json(json!({ "traits": { "vip": false } })))
            .respond_with(ResponseTemplate::new(200))
            .expect(2)
            .mount(&server)
            .await;

        let report = provider(&server.uri())
            .sync_segment_membership(&users(2), "vip", false, &ConfigMap::new(), &secrets())
            .await
            .unwrap();
        assert_eq!(report.succeeded, 2);
    }
}
