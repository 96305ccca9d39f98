//! GitHub: OAuth app, issue creation and issue state webhooks.

use std::sync::Arc;

use async_trait::async_trait;
use murmur_core::{Error, Result};
use murmur_webhook::reqwest::ProviderClient;
use murmur_webhook::{HookResult, InboundRequest, InboundResponse, SignatureScheme};
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::{authorize_url, endpoint, into_hook_result};
use crate::capability::{
    DisconnectCapability, HookCapability, HookTarget, InboundCapability, InboundWebhookResult,
    OAuthCapability, PlatformCredentials, TokenGrant, require_credentials,
};
use crate::connection::{ConfigMap, SecretMap};
use crate::definition::{
    CatalogInfo, IntegrationAuthType, IntegrationCategory, IntegrationDefinition,
    IntegrationType, OAUTH_CLIENT_FIELDS,
};
use crate::event::DomainEvent;

const OAUTH_BASE: &str = "https://github.com";
const API_BASE: &str = "https://api.github.com";
const GITHUB_JSON: &str = "application/vnd.github+json";

const CATALOG: CatalogInfo = CatalogInfo {
    name: "GitHub",
    description: "Open issues from feedback and sync their state back",
    category: IntegrationCategory::IssueTracking,
    auth_type: IntegrationAuthType::OAuth2,
};

/// GitHub OAuth app integration.
#[derive(Debug, Clone)]
pub struct GithubProvider {
    client: ProviderClient,
    oauth_base: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    error: Option<String>,
    error_description: Option<String>,
}

impl GithubProvider {
    /// Creates a provider against github.com.
    pub fn new(client: ProviderClient) -> Self {
        Self {
            client,
            oauth_base: OAUTH_BASE.to_owned(),
            api_base: API_BASE.to_owned(),
        }
    }

    /// Overrides the OAuth and REST API base URLs.
    pub fn with_base_urls(mut self, oauth_base: &str, api_base: &str) -> Self {
        self.oauth_base = oauth_base.to_owned();
        self.api_base = api_base.to_owned();
        self
    }

    /// Returns the integration definition.
    pub fn definition(self) -> IntegrationDefinition {
        let provider = Arc::new(self);
        IntegrationDefinition::new(IntegrationType::Github, CATALOG)
            .with_oauth(provider.clone())
            .with_hook(provider.clone())
            .with_inbound(provider.clone())
            .with_on_disconnect(provider)
            .with_platform_credentials(OAUTH_CLIENT_FIELDS)
    }

    /// Looks up the login of the token owner.
    async fn who_am_i(&self, token: &str) -> Result<Option<String>> {
        let request = self
            .client
            .http()
            .get(endpoint(&self.api_base, "user"))
            .header(ACCEPT, GITHUB_JSON)
            .bearer_auth(token);

        let body = self.client.send(request).await?.error_for_status("github")?.body;
        Ok(body.get("login").and_then(Value::as_str).map(str::to_owned))
    }
}

#[async_trait]
impl OAuthCapability for GithubProvider {
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
            "/login/oauth/authorize",
            &[
                ("client_id", client_id),
                ("scope", "repo"),
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
            .post(endpoint(&self.oauth_base, "login/oauth/access_token"))
            .header(ACCEPT, "application/json")
            .form(&[
                ("client_id", credentials.require("clientId")?),
                ("client_secret", credentials.require("clientSecret")?),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ]);

        let body = self.client.send(request).await?.error_for_status("github")?.body;
        let token: TokenResponse = serde_json::from_value(body)?;

        let Some(access_token) = token.access_token.filter(|_| token.error.is_none()) else {
            let reason = token
                .error_description
                .or(token.error)
                .unwrap_or_else(|| "no access token returned".into());
            return Err(Error::authentication()
                .with_message(format!("GitHub rejected the authorization code: {reason}"))
                .with_context("github"));
        };

        let mut config = ConfigMap::new();
        if let Some(login) = self.who_am_i(&access_token).await? {
            config.insert("accountLogin".into(), login.into());
        }

        Ok(TokenGrant {
            access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
            config,
        })
    }
}

#[async_trait]
impl HookCapability for GithubProvider {
    async fn run(&self, event: &DomainEvent, target: &HookTarget, config: &ConfigMap) -> HookResult {
        let DomainEvent::PostCreated { actor, post } = event else {
            return HookResult::skipped();
        };
        let Some(token) = target.secret("accessToken") else {
            return HookResult::failure("github access token is missing", false);
        };
        let Some(repository) = config
            .get("repository")
            .and_then(Value::as_str)
            .filter(|repo| repo.split_once('/').is_some_and(|(o, r)| !o.is_empty() && !r.is_empty()))
        else {
            return HookResult::failure("github repository is not configured", false);
        };

        let body = format!(
            "{}\n\n---\nSubmitted by {} via [feedback]({})",
            post.content.as_deref().unwrap_or_default(),
            actor.label(),
            post.url
        );
        let request = self
            .client
            .http()
            .post(endpoint(&self.api_base, &format!("repos/{repository}/issues")))
            .header(ACCEPT, GITHUB_JSON)
            .bearer_auth(token)
            .json(&json!({ "title": post.title, "body": body }));

        into_hook_result(self.client.send(request).await, |response| {
            match response.body.get("number").and_then(Value::as_u64) {
                Some(number) => HookResult::created(
                    format!("{repository}#{number}"),
                    response
                        .body
                        .get("html_url")
                        .and_then(Value::as_str)
                        .map(str::to_owned),
                ),
                None => HookResult::ok(),
            }
        })
    }
}

impl InboundCapability for GithubProvider {
    fn verify_signature(
        &self,
        request: &InboundRequest,
        secret: &str,
    ) -> std::result::Result<(), InboundResponse> {
        SignatureScheme::PrefixedSha256
            .verify(&request.headers, &request.body, secret)
            .map_err(InboundResponse::from)
    }

    fn parse_status_change(&self, payload: &Value, _config: &ConfigMap) -> Option<InboundWebhookResult> {
        let action = payload.get("action")?.as_str()?;
        let status = match action {
            "closed" => "Closed",
            "reopened" => "Open",
            _ => return None,
        };

        let number = payload.get("issue")?.get("number")?.as_u64()?;
        let repository = payload.get("repository")?.get("full_name")?.as_str()?;

        Some(InboundWebhookResult {
            external_id: format!("{repository}#{number}"),
            external_status: status.to_owned(),
            event_type: format!("issues.{action}"),
        })
    }
}

#[async_trait]
impl DisconnectCapability for GithubProvider {
    async fn on_disconnect(
        &self,
        secrets: &SecretMap,
        _config: &ConfigMap,
        credentials: Option<&PlatformCredentials>,
    ) -> Result<()> {
        let Some(token) = secrets.get("accessToken").and_then(Value::as_str) else {
            return Ok(());
        };
        let credentials = require_credentials(credentials)?;
        let client_id = credentials.require("clientId")?;

        let request = self
            .client
            .http()
            .delete(endpoint(&self.api_base, &format!("applications/{client_id}/grant")))
            .header(ACCEPT, GITHUB_JSON)
            .basic_auth(client_id, Some(credentials.require("clientSecret")?))
            .json(&json!({ "access_token": token }));

        self.client.send(request).await?.error_for_status("github")?;
        Ok(())
    }
}
