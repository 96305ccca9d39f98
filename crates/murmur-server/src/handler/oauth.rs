//! OAuth connect and callback endpoints.
//!
//! The connect step redirects an admin to the provider's consent screen. The
//! callback always lands the browser back on the settings page, carrying
//! `status=connected` or `status=error` with a reason.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::middleware::from_fn_with_state;
use axum::response::Redirect;
use axum::routing::get;
use murmur_integration::{IntegrationConnection, IntegrationHub};

use crate::extract::{Path, Query};
use crate::handler::request::{CallbackQuery, ConnectQuery, IntegrationPathParams};
use crate::handler::{Result, parse_integration_type};
use crate::middleware::rate_limit_oauth;
use crate::service::{ServiceState, ServiceUrls};

/// Tracing target for OAuth operations.
const TRACING_TARGET: &str = "murmur_server::handler::oauth";

/// Redirects to the provider authorization URL.
#[tracing::instrument(
    skip_all,
    fields(
        integration_type = %path_params.integration_type,
        workspace_id = %query.workspace_id,
    )
)]
async fn connect(
    State(hub): State<IntegrationHub>,
    State(urls): State<Arc<ServiceUrls>>,
    Path(path_params): Path<IntegrationPathParams>,
    Query(query): Query<ConnectQuery>,
) -> Result<Redirect> {
    let integration_type = parse_integration_type(&path_params.integration_type)?;

    let url = hub
        .oauth()
        .build_auth_url(
            integration_type,
            query.workspace_id,
            query.member_id,
            &urls.redirect_uri(integration_type),
            query.config(),
        )
        .await?;

    tracing::info!(
        target: TRACING_TARGET,
        member_id = %query.member_id,
        "Redirecting to provider consent"
    );

    Ok(Redirect::to(url.as_str()))
}

/// Completes the authorization code exchange and returns to the settings page.
#[tracing::instrument(
    skip_all,
    fields(integration_type = %path_params.integration_type)
)]
async fn callback(
    State(hub): State<IntegrationHub>,
    State(urls): State<Arc<ServiceUrls>>,
    Path(path_params): Path<IntegrationPathParams>,
    Query(query): Query<CallbackQuery>,
) -> Redirect {
    let type_name = path_params.integration_type;

    let location = match complete(&hub, &urls, &type_name, query).await {
        Ok(connection) => {
            tracing::info!(
                target: TRACING_TARGET,
                workspace_id = %connection.workspace_id,
                connection_id = %connection.id,
                "OAuth callback completed"
            );
            urls.settings_redirect(&type_name, "connected", None)
        }
        Err(reason) => {
            tracing::warn!(
                target: TRACING_TARGET,
                reason = %reason,
                "OAuth callback failed"
            );
            urls.settings_redirect(&type_name, "error", Some(&reason))
        }
    };

    Redirect::to(location.as_str())
}

/// Runs the callback, reducing any failure to a reason safe to show.
async fn complete(
    hub: &IntegrationHub,
    urls: &ServiceUrls,
    type_name: &str,
    query: CallbackQuery,
) -> std::result::Result<IntegrationConnection, String> {
    if let Some(error) = query.error {
        return Err(query.error_description.unwrap_or(error));
    }

    let (Some(code), Some(state)) = (query.code, query.state) else {
        return Err("missing code or state".to_owned());
    };

    let integration_type =
        parse_integration_type(type_name).map_err(|_| "unknown integration".to_owned())?;

    hub.oauth()
        .complete_callback(
            integration_type,
            &code,
            &state,
            &urls.redirect_uri(integration_type),
        )
        .await
        .map_err(|error| error.message_or_kind().to_owned())
}

/// Returns a [`Router`] with the OAuth routes, rate limited per integration
/// and client.
pub fn routes(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route("/oauth/{integration_type}/connect", get(connect))
        .route("/oauth/{integration_type}/callback", get(callback))
        .route_layer(from_fn_with_state(state, rate_limit_oauth))
}

#[cfg(test)]
mod tests {
    use axum::http::header::{HeaderName, LOCATION};
    use axum::http::{HeaderValue, StatusCode};
    use murmur_integration::IntegrationType;
    use murmur_integration::store::ConnectionStore;
    use murmur_webhook::SignatureScheme;
    use serde_json::{Value, json};
    use url::Url;
    use uuid::Uuid;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, ResponseTemplate};

    use crate::handler::test::{TestContext, create_test_context};

    fn query_value(url: &Url, key: &str) -> Option<String> {
        url.query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
    }

    fn location(response: &axum_test::TestResponse) -> Url {
        let value = response.headers().get(LOCATION).expect("location header");
        Url::parse(value.to_str().unwrap()).unwrap()
    }

    async fn start_slack_flow(context: &TestContext, workspace_id: Uuid) -> Url {
        context.configure_slack().await;

        let response = context
            .server
            .get("/oauth/slack/connect")
            .add_query_param("workspaceId", workspace_id)
            .add_query_param("memberId", Uuid::now_v7())
            .add_query_param("channelId", "C123")
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        location(&response)
    }

    #[tokio::test]
    async fn connect_redirects_to_consent() -> anyhow::Result<()> {
        let context = create_test_context().await?;
        let url = start_slack_flow(&context, Uuid::now_v7()).await;

        assert_eq!(url.path(), "/oauth/v2/authorize");
        assert_eq!(query_value(&url, "client_id").as_deref(), Some("slack-client"));
        assert_eq!(
            query_value(&url, "redirect_uri").as_deref(),
            Some("http://localhost:8080/oauth/slack/callback")
        );
        assert!(query_value(&url, "state").is_some());

        Ok(())
    }

    #[tokio::test]
    async fn connect_without_platform_credentials_conflicts() -> anyhow::Result<()> {
        let context = create_test_context().await?;

        let response = context
            .server
            .get("/oauth/slack/connect")
            .add_query_param("workspaceId", Uuid::now_v7())
            .add_query_param("memberId", Uuid::now_v7())
            .await;

        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(response.json::<Value>()["name"], "conflict");

        Ok(())
    }

    #[tokio::test]
    async fn connect_unknown_or_manual_integration_is_not_found() -> anyhow::Result<()> {
        let context = create_test_context().await?;

        for name in ["myspace", "shortcut"] {
            context
                .server
                .get(&format!("/oauth/{name}/connect"))
                .add_query_param("workspaceId", Uuid::now_v7())
                .add_query_param("memberId", Uuid::now_v7())
                .await
                .assert_status_not_found();
        }

        Ok(())
    }

    #[tokio::test]
    async fn callback_stores_connection() -> anyhow::Result<()> {
        let context = create_test_context().await?;
        let workspace_id = Uuid::now_v7();
        let consent = start_slack_flow(&context, workspace_id).await;
        let state = query_value(&consent, "state").unwrap();

        Mock::given(method("POST"))
            .and(path("/oauth.v2.access"))
            .and(body_string_contains("code=granted"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "access_token": "xoxb-1",
                "team": { "id": "T1", "name": "Acme" },
            })))
            .expect(1)
            .mount(&context.mock)
            .await;

        let response = context
            .server
            .get("/oauth/slack/callback")
            .add_query_param("code", "granted")
            .add_query_param("state", &state)
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        let settings = location(&response);
        assert_eq!(query_value(&settings, "integration").as_deref(), Some("slack"));
        assert_eq!(query_value(&settings, "status").as_deref(), Some("connected"));

        let connection = context
            .store
            .find(workspace_id, IntegrationType::Slack)
            .await?
            .expect("connection stored");
        assert_eq!(connection.config_str("channelId"), Some("C123"));
        assert_eq!(connection.config_str("teamName"), Some("Acme"));

        Ok(())
    }

    #[tokio::test]
    async fn callback_with_provider_error_redirects_with_reason() -> anyhow::Result<()> {
        let context = create_test_context().await?;

        let response = context
            .server
            .get("/oauth/slack/callback")
            .add_query_param("error", "access_denied")
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        let settings = location(&response);
        assert_eq!(query_value(&settings, "status").as_deref(), Some("error"));
        assert_eq!(query_value(&settings, "reason").as_deref(), Some("access_denied"));

        Ok(())
    }

    #[tokio::test]
    async fn callback_with_forged_state_redirects_with_error() -> anyhow::Result<()> {
        let context = create_test_context().await?;
        context.configure_slack().await;

        let response = context
            .server
            .get("/oauth/slack/callback")
            .add_query_param("code", "granted")
            .add_query_param("state", "forged.state")
            .await;

        response.assert_status(StatusCode::SEE_OTHER);
        let settings = location(&response);
        assert_eq!(query_value(&settings, "status").as_deref(), Some("error"));
        assert!(query_value(&settings, "reason").is_some());

        Ok(())
    }

    #[tokio::test]
    async fn github_connection_receives_signed_webhooks() -> anyhow::Result<()> {
        let context = create_test_context().await?;
        context.configure_github().await;
        let workspace_id = Uuid::now_v7();

        let response = context
            .server
            .get("/oauth/github/connect")
            .add_query_param("workspaceId", workspace_id)
            .add_query_param("memberId", Uuid::now_v7())
            .await;
        response.assert_status(StatusCode::SEE_OTHER);
        let state = query_value(&location(&response), "state").unwrap();

        Mock::given(method("POST"))
            .and(path("/login/oauth/access_token"))
            .and(body_string_contains("code=granted"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "access_token": "gho_1" })),
            )
            .mount(&context.mock)
            .await;
        Mock::given(method("GET"))
            .and(path("/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "login": "octocat" })))
            .mount(&context.mock)
            .await;

        let response = context
            .server
            .get("/oauth/github/callback")
            .add_query_param("code", "granted")
            .add_query_param("state", &state)
            .await;
        let settings = location(&response);
        assert_eq!(query_value(&settings, "status").as_deref(), Some("connected"));

        let response = context
            .server
            .patch(&format!(
                "/api/workspaces/{workspace_id}/integrations/github/secrets"
            ))
            .json(&json!({ "secrets": { "webhookSecret": "whsec" } }))
            .await;
        response.assert_status_ok();
        assert!(!response.text().contains("whsec"));

        let body = serde_json::to_vec(&json!({
            "action": "closed",
            "issue": { "number": 7 },
            "repository": { "full_name": "acme/feedback" },
        }))?;
        let signature = SignatureScheme::PrefixedSha256.sign(b"whsec", &body);

        let response = context
            .server
            .post("/api/integrations/github/webhook")
            .add_query_param("workspaceId", workspace_id)
            .add_header(
                HeaderName::from_static("x-hub-signature-256"),
                HeaderValue::from_str(&signature)?,
            )
            .bytes(body.into())
            .await;
        response.assert_status_ok();

        let updates = context.store.status_updates().await;
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].result.external_id, "acme/feedback#7");
        assert_eq!(updates[0].result.external_status, "Closed");

        let connection = context
            .store
            .find(workspace_id, IntegrationType::Github)
            .await?
            .expect("connection stored");
        assert_eq!(connection.config_str("accountLogin"), Some("octocat"));

        Ok(())
    }
}
