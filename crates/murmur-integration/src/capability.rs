//! Capability traits an integration may implement.
//!
//! A definition composes any subset of these; the hub components only ever
//! talk to integrations through them.

use async_trait::async_trait;
use jiff::{SignedDuration, Timestamp};
use murmur_core::{Error, Result};
use murmur_webhook::{HookResult, InboundRequest, InboundResponse};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;
use uuid::Uuid;

use crate::connection::{ConfigMap, SecretMap};
use crate::event::DomainEvent;
use crate::sync::BatchReport;

/// Secret key holding the inbound webhook signing secret.
pub const WEBHOOK_SECRET_KEY: &str = "webhookSecret";

/// Admin-supplied, app-level credentials for one integration type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformCredentials(pub Map<String, Value>);

impl PlatformCredentials {
    /// Returns a non-empty string credential.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Returns a credential or a configuration error naming it.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key).ok_or_else(|| {
            Error::configuration().with_message(format!("platform credential `{key}` is not set"))
        })
    }
}

/// Returns the platform credentials or a configuration error.
pub fn require_credentials(credentials: Option<&PlatformCredentials>) -> Result<&PlatformCredentials> {
    credentials
        .ok_or_else(|| Error::configuration().with_message("platform credentials are not configured"))
}

/// Tokens returned by a successful authorization code exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenGrant {
    /// Access token.
    pub access_token: String,
    /// Refresh token, for providers that rotate.
    pub refresh_token: Option<String>,
    /// Lifetime in seconds; `None` for non-expiring tokens.
    pub expires_in: Option<i64>,
    /// Display identity discovered during the exchange.
    pub config: ConfigMap,
}

impl TokenGrant {
    /// Splits the grant into the secrets to seal and the plain config.
    pub fn into_parts(self, now: Timestamp) -> (SecretMap, ConfigMap) {
        let mut secrets = SecretMap::new();
        secrets.insert("accessToken".into(), Value::String(self.access_token));
        if let Some(refresh_token) = self.refresh_token {
            secrets.insert("refreshToken".into(), Value::String(refresh_token));
        }
        if let Some(expires_at) = self
            .expires_in
            .and_then(|secs| now.checked_add(SignedDuration::from_secs(secs)).ok())
        {
            secrets.insert("expiresAt".into(), Value::String(expires_at.to_string()));
        }

        (secrets, self.config)
    }
}

/// OAuth 2.0 authorization code flow.
#[async_trait]
pub trait OAuthCapability: Send + Sync {
    /// Builds the provider authorization URL.
    fn authorization_url(
        &self,
        state: &str,
        redirect_uri: &str,
        fields: &ConfigMap,
        credentials: Option<&PlatformCredentials>,
    ) -> Result<Url>;

    /// Exchanges an authorization code for tokens.
    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        fields: &ConfigMap,
        credentials: Option<&PlatformCredentials>,
    ) -> Result<TokenGrant>;
}

/// Destination of one hook run.
#[derive(Debug, Clone)]
pub struct HookTarget {
    /// Connection being delivered to.
    pub connection_id: Uuid,
    /// Workspace the event belongs to.
    pub workspace_id: Uuid,
    /// Decrypted connection secrets.
    pub secrets: SecretMap,
}

impl HookTarget {
    /// Returns a string secret.
    pub fn secret(&self, key: &str) -> Option<&str> {
        self.secrets.get(key).and_then(Value::as_str)
    }
}

/// Outbound notification of domain events.
#[async_trait]
pub trait HookCapability: Send + Sync {
    /// Delivers `event`. Events the provider ignores return success.
    async fn run(&self, event: &DomainEvent, target: &HookTarget, config: &ConfigMap) -> HookResult;
}

/// Status change extracted from a provider webhook.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundWebhookResult {
    /// Provider-side identifier of the linked object.
    pub external_id: String,
    /// Raw provider status label.
    pub external_status: String,
    /// Provider event name.
    pub event_type: String,
}

/// Inbound status-change webhooks.
pub trait InboundCapability: Send + Sync {
    /// Verifies the delivery. An `Err` is returned to the provider verbatim.
    fn verify_signature(
        &self,
        request: &InboundRequest,
        secret: &str,
    ) -> std::result::Result<(), InboundResponse>;

    /// Extracts a status change; `None` for irrelevant or unmappable events.
    fn parse_status_change(&self, payload: &Value, config: &ConfigMap)
    -> Option<InboundWebhookResult>;

    /// Returns the signing secret from the connection secrets.
    fn webhook_secret<'a>(&self, secrets: &'a SecretMap) -> Option<&'a str> {
        secrets
            .get(WEBHOOK_SECRET_KEY)
            .and_then(Value::as_str)
            .filter(|secret| !secret.is_empty())
    }
}

/// Normalized inbound identify call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentifyPayload {
    /// Correlation key into the user table.
    pub email: String,
    /// Provider-side user identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_user_id: Option<String>,
    /// Raw provider attributes.
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// What an identify handler decided.
#[derive(Debug, Clone, PartialEq)]
pub enum IdentifyOutcome {
    /// Stop and answer the provider with this response.
    Respond(InboundResponse),
    /// Merge this payload into the matching user.
    Payload(UserIdentifyPayload),
}

/// Inbound identify calls from a customer data platform.
#[async_trait]
pub trait IdentifyCapability: Send + Sync {
    /// Verifies and parses an identify delivery.
    async fn handle_identify(
        &self,
        request: &InboundRequest,
        config: &ConfigMap,
        secrets: &SecretMap,
    ) -> IdentifyOutcome;
}

/// A principal resolved for outbound segment sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncUser {
    /// Principal identifier.
    pub principal_id: Uuid,
    /// Email address.
    pub email: String,
    /// Provider-side user identifier stored by a previous identify.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_user_id: Option<String>,
}

/// Outbound segment membership sync.
#[async_trait]
pub trait SegmentSyncCapability: Send + Sync {
    /// Pushes `joined` membership of `segment` for every user.
    ///
    /// Implementations batch their own calls and report partial failure as
    /// a single error carrying the failure count.
    async fn sync_segment_membership(
        &self,
        users: &[SyncUser],
        segment: &str,
        joined: bool,
        config: &ConfigMap,
        secrets: &SecretMap,
    ) -> Result<BatchReport>;
}

/// Cleanup when a workspace removes a connection.
#[async_trait]
pub trait DisconnectCapability: Send + Sync {
    /// Best-effort revocation of the external token.
    async fn on_disconnect(
        &self,
        secrets: &SecretMap,
        config: &ConfigMap,
        credentials: Option<&PlatformCredentials>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_grant_with_expiry() {
        let now: Timestamp = "2026-01-01T00:00:00Z".parse().unwrap();
        let grant = TokenGrant {
            access_token: "gho_abc".into(),
            refresh_token: Some("ghr_def".into()),
            expires_in: Some(3600),
            config: ConfigMap::new(),
        };

        let (secrets, _) = grant.into_parts(now);
        assert_eq!(secrets["accessToken"], "gho_abc");
        assert_eq!(secrets["refreshToken"], "ghr_def");
        assert_eq!(secrets["expiresAt"], "2026-01-01T01:00:00Z");
    }

    #[test]
    fn test_grant_without_expiry() {
        let grant = TokenGrant {
            access_token: "xoxb".into(),
            ..TokenGrant::default()
        };

        let (secrets, config) = grant.into_parts(Timestamp::now());
        assert_eq!(secrets.len(), 1);
        assert!(config.is_empty());
    }

    #[test]
    fn test_platform_credentials() {
        let credentials: PlatformCredentials =
            serde_json::from_value(json!({ "clientId": "abc", "clientSecret": "" })).unwrap();

        assert_eq!(credentials.require("clientId").unwrap(), "abc");
        assert!(credentials.get("clientSecret").is_none());
        assert_eq!(
            credentials.require("clientSecret").unwrap_err().kind,
            murmur_core::ErrorKind::Configuration
        );
        assert!(require_credentials(None).is_err());
    }
}
