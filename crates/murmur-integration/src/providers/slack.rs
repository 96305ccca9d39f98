//! Slack: OAuth v2 install and channel notifications.

use std::sync::Arc;

use async_trait::async_trait;
use murmur_core::{Error, Result};
use murmur_webhook::HookResult;
use murmur_webhook::reqwest::ProviderClient;
use serde_json::{Value, json};
use url::Url;

use super::{TRACING_TARGET, authorize_url, endpoint, into_hook_result};
use crate::capability::{
    DisconnectCapability, HookCapability, HookTarget, OAuthCapability, PlatformCredentials,
    TokenGrant, require_credentials,
};
use crate::connection::{ConfigMap, SecretMap};
use crate::definition::{
    CatalogInfo, IntegrationAuthType, IntegrationCategory, IntegrationDefinition,
    IntegrationType, OAUTH_CLIENT_FIELDS,
};
use crate::event::DomainEvent;

const OAUTH_BASE: &str = "https://slack.com";
const API_BASE: &str = "https://slack.com/api";
const SCOPES: &str = "chat:write,channels:read";

/// Slack errors that mean the token is gone for good.
const AUTH_ERRORS: &[&str] = &["invalid_auth", "token_revoked", "account_inactive", "not_authed"];

const CATALOG: CatalogInfo = CatalogInfo {
    name: "Slack",
    description: "Post new feedback, status changes and comments to a channel",
    category: IntegrationCategory::Communication,
    auth_type: IntegrationAuthType::OAuth2,
};

/// Slack workspace integration.
#[derive(Debug, Clone)]
pub struct SlackProvider {
    client: ProviderClient,
    oauth_base: String,
    api_base: String,
}

impl SlackProvider {
    /// Creates a provider against slack.com.
    pub fn new(client: ProviderClient) -> Self {
        Self {
            client,
            oauth_base: OAUTH_BASE.to_owned(),
            api_base: API_BASE.to_owned(),
        }
    }

    /// Overrides the OAuth and Web API base URLs.
    pub fn with_base_urls(mut self, oauth_base: &str, api_base: &str) -> Self {
        self.oauth_base = oauth_base.to_owned();
        self.api_base = api_base.to_owned();
        self
    }

    /// Returns the integration definition.
    pub fn definition(self) -> IntegrationDefinition {
        let provider = Arc::new(self);
        IntegrationDefinition::new(IntegrationType::Slack, CATALOG)
            .with_oauth(provider.clone())
            .with_hook(provider.clone())
            .with_on_disconnect(provider)
            .with_platform_credentials(OAUTH_CLIENT_FIELDS)
    }
}

/// Classifies an in-band `{"ok": false, "error": ...}` failure.
fn classify_error(code: &str) -> HookResult {
    if AUTH_ERRORS.contains(&code) {
        return HookResult::failure(format!("slack token is no longer valid: {code}"), false);
    }
    HookResult::failure(format!("slack error: {code}"), code == "ratelimited")
}

fn error_code(body: &Value) -> &str {
    body.get("error").and_then(Value::as_str).unwrap_or("unknown_error")
}

fn message_text(event: &DomainEvent) -> Option<String> {
    match event {
        DomainEvent::PostCreated { actor, post } => Some(format!(
            "*New feedback* from {}: <{}|{}>",
            actor.label(),
            post.url,
            post.title
        )),
        DomainEvent::PostStatusChanged {
            post,
            previous_status,
            new_status,
            ..
        } => Some(format!(
            "<{}|{}> moved from *{previous_status}* to *{new_status}*",
            post.url, post.title
        )),
        DomainEvent::CommentCreated {
            actor,
            post,
            comment,
        } => Some(format!(
            "{} commented on <{}|{}>: {}",
            actor.label(),
            post.url,
            post.title,
            comment.content
        )),
        _ => None,
    }
}

#[async_trait]
impl OAuthCapability for SlackProvider {
    fn authorization_url(
        &self,
        state: &str,
        redirect_uri: &str,
        _fields: &ConfigMap,
        credentials: Option<&PlatformCredentials>,
    ) -> Result<Url> {
        let client_id = require_credentials(credentials)?.require("clientId")?;
        authorize_url(
            &self.oauth_base,
            "/oauth/v2/authorize",
            &[
                ("client_id", client_id),
                ("scope", SCOPES),
                ("redirect_uri", redirect_uri),
                ("state", state),
            ],
        )
    }

    async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        _fields: &ConfigMap,
        credentials: Option<&PlatformCredentials>,
    ) -> Result<TokenGrant> {
        let credentials = require_credentials(credentials)?;
        let request = self
            .client
            .http()
            .post(endpoint(&self.api_base, "oauth.v2.access"))
            .form(&[
                ("client_id", credentials.require("clientId")?),
                ("client_secret", credentials.require("clientSecret")?),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ]);

        let body = self.client.send(request).await?.error_for_status("slack")?.body;
        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            return Err(Error::authentication()
                .with_message(format!(
                    "Slack rejected the authorization code: {}",
                    error_code(&body)
                ))
                .with_context("slack"));
        }

        let access_token = body
            .get("access_token")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::external_error().with_message("Slack returned no access token"))?;

        let mut config = ConfigMap::new();
        if let Some(team) = body.get("team") {
            for (from, to) in [("id", "teamId"), ("name", "teamName")] {
                if let Some(value) = team.get(from).and_then(Value::as_str) {
                    config.insert(to.into(), value.into());
                }
            }
        }

        Ok(TokenGrant {
            access_token: access_token.to_owned(),
            refresh_token: None,
            expires_in: None,
            config,
        })
    }
}

#[async_trait]
impl HookCapability for SlackProvider {
    async fn run(&self, event: &DomainEvent, target: &HookTarget, config: &ConfigMap) -> HookResult {
        let Some(text) = message_text(event) else {
            return HookResult::skipped();
        };
        let Some(token) = target.secret("accessToken") else {
            return HookResult::failure("slack access token is missing", false);
        };
        let Some(channel) = config.get("channelId").and_then(Value::as_str) else {
            return HookResult::failure("slack channel is not configured", false);
        };

        let request = self
            .client
            .http()
            .post(endpoint(&self.api_base, "chat.postMessage"))
            .bearer_auth(token)
            .json(&json!({ "channel": channel, "text": text, "unfurl_links": false }));

        into_hook_result(self.client.send(request).await, |response| {
            if response.body.get("ok").and_then(Value::as_bool) == Some(true) {
                match response.body.get("ts").and_then(Value::as_str) {
                    Some(ts) => HookResult::created(ts, None),
                    None => HookResult::ok(),
                }
            } else {
                let result = classify_error(error_code(&response.body));
                tracing::debug!(
                    target: TRACING_TARGET,
                    connection_id = %target.connection_id,
                    should_retry = result.is_retryable(),
                    "Slack rejected message"
                );
                result
            }
        })
    }
}

#[async_trait]
impl DisconnectCapability for SlackProvider {
    async fn on_disconnect(
        &self,
        secrets: &SecretMap,
        _config: &ConfigMap,
        _credentials: Option<&PlatformCredentials>,
    ) -> Result<()> {
        let Some(token) = secrets.get("accessToken").and_then(Value::as_str) else {
            return Ok(());
        };

        let request = self
            .client
            .http()
            .post(endpoint(&self.api_base, "auth.revoke"))
            .bearer_auth(token);
        self.client.send(request).await?.error_for_status("slack")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;
    use wiremock::matchers::{bearer_token, body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::event::fixtures::{actor, post, post_created};
    use crate::providers::tests::client;

    fn provider(base: &str) -> SlackProvider {
        SlackProvider::new(client()).with_base_urls(base, base)
    }

    fn target() -> HookTarget {
        let mut secrets = SecretMap::new();
        secrets.insert("accessToken".into(), "xoxb-1".into());
        HookTarget {
            connection_id: Uuid::nil(),
            workspace_id: Uuid::nil(),
            secrets,
        }
    }

    fn config() -> ConfigMap {
        let mut config = ConfigMap::new();
        config.insert("channelId".into(), "C123".into());
        config
    }

    async fn respond_with(body: Value) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat.postMessage"))
            .and(bearer_token("xoxb-1"))
            .and(body_partial_json(json!({ "channel": "C123" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_posts_message() {
        let server = respond_with(json!({ "ok": true, "ts": "1700000000.1" })).await;

        let result = provider(&server.uri())
            .run(&post_created(), &target(), &config())
            .await;
        assert!(result.success);
        assert_eq!(result.external_id.as_deref(), Some("1700000000.1"));
    }

    #[tokio::test]
    async fn test_in_band_errors_are_classified() {
        let server = respond_with(json!({ "ok": false, "error": "token_revoked" })).await;
        let result = provider(&server.uri())
            .run(&post_created(), &target(), &config())
            .await;
        assert!(!result.success);
        assert_eq!(result.should_retry, Some(false));

        let server = respond_with(json!({ "ok": false, "error": "ratelimited" })).await;
        let result = provider(&server.uri())
            .run(&post_created(), &target(), &config())
            .await;
        assert!(result.is_retryable());
    }

    #[tokio::test]
    async fn test_http_errors_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = provider(&server.uri())
            .run(&post_created(), &target(), &config())
            .await;
        assert!(result.is_retryable());
    }

    #[tokio::test]
    async fn test_ignored_events_and_missing_channel() {
        let provider = provider("http://127.0.0.1:9");
        let deleted = DomainEvent::PostDeleted {
            actor: actor(),
            post_id: post().id,
        };

        assert!(provider.run(&deleted, &target(), &config()).await.success);

        let result = provider.run(&post_created(), &target(), &ConfigMap::new()).await;
        assert_eq!(result.should_retry, Some(false));
    }

    #[test]
    fn test_authorization_url() {
        let credentials: PlatformCredentials =
            serde_json::from_value(json!({ "clientId": "cid", "clientSecret": "s" })).unwrap();
        let url = provider("https://slack.example")
            .authorization_url(
                "st",
                "https://app/cb",
                &ConfigMap::new(),
                Some(&credentials),
            )
            .unwrap();

        assert_eq!(url.path(), "/oauth/v2/authorize");
        assert!(url.query_pairs().any(|(k, v)| k == "state" && v == "st"));
        assert!(
            provider("https://slack.example")
                .authorization_url("st", "https://app/cb", &ConfigMap::new(), None)
                .is_err()
        );
    }
}
