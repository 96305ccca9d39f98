//! All `axum::`[`Router`]s with related `axum::`[`Handler`]s.
//!
//! # Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use axum::Router;
//! use murmur_integration::HubStores;
//! use murmur_integration::store::MemoryStore;
//! use murmur_server::handler::routes;
//! use murmur_server::service::{ServiceConfig, ServiceState};
//!
//! # fn example() -> murmur_server::Result<()> {
//! let config = ServiceConfig::default();
//! let stores = HubStores::in_memory(Arc::new(MemoryStore::new()));
//! let state = ServiceState::from_config(&config, stores)?;
//!
//! let router: Router = routes(state.clone()).with_state(state);
//! # Ok(())
//! # }
//! ```
//!
//! [`Router`]: axum::routing::Router
//! [`Handler`]: axum::handler::Handler

mod error;
mod events;
mod integrations;
mod monitors;
mod oauth;
pub mod request;
pub mod response;
mod webhooks;

use std::str::FromStr;

use axum::Router;
use axum::response::{IntoResponse, Response};
use murmur_integration::IntegrationType;

pub use crate::handler::error::{Error, ErrorKind, Result};
use crate::service::ServiceState;

#[inline]
async fn fallback() -> Response {
    ErrorKind::NotFound.into_response()
}

/// Parses the `{integration_type}` path segment, `404` when unknown.
pub(crate) fn parse_integration_type(name: &str) -> Result<IntegrationType> {
    IntegrationType::from_str(name).map_err(|_| {
        ErrorKind::NotFound
            .with_message(format!("Unknown integration `{name}`"))
            .with_resource("integration")
    })
}

/// Returns a [`Router`] with every route.
///
/// Provider-facing routes carry their own rate limiting; the state is only
/// needed to build those layers.
pub fn routes(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .merge(webhooks::routes(state.clone()))
        .merge(oauth::routes(state))
        .merge(integrations::routes())
        .merge(events::routes())
        .merge(monitors::routes())
        .fallback(fallback)
}

#[cfg(test)]
pub(crate) mod test {
    use std::sync::Arc;

    use axum::Router;
    use axum_test::TestServer;
    use murmur_integration::capability::PlatformCredentials;
    use murmur_integration::providers::{
        GithubProvider, SegmentProvider, ShortcutProvider, SlackProvider, ZapierProvider,
    };
    use murmur_integration::store::MemoryStore;
    use murmur_integration::{HubStores, IntegrationRegistry, IntegrationType};
    use murmur_webhook::reqwest::{ProviderClient, ReqwestConfig};
    use serde_json::json;
    use wiremock::MockServer;

    use crate::handler::routes;
    use crate::service::{ServiceConfig, ServiceState};

    /// A running server backed by an in-memory store, with every provider
    /// pointed at one mock server.
    pub struct TestContext {
        pub server: TestServer,
        pub store: Arc<MemoryStore>,
        pub mock: MockServer,
    }

    impl TestContext {
        /// Configures Slack platform credentials.
        pub async fn configure_slack(&self) {
            let credentials: PlatformCredentials = serde_json::from_value(json!({
                "clientId": "slack-client",
                "clientSecret": "slack-secret",
            }))
            .expect("valid credentials");

            self.store
                .set_platform_credentials(IntegrationType::Slack, credentials)
                .await;
        }

        /// Configures GitHub platform credentials.
        pub async fn configure_github(&self) {
            let credentials: PlatformCredentials = serde_json::from_value(json!({
                "clientId": "github-client",
                "clientSecret": "github-secret",
            }))
            .expect("valid credentials");

            self.store
                .set_platform_credentials(IntegrationType::Github, credentials)
                .await;
        }
    }

    fn mock_registry(base: &str) -> anyhow::Result<IntegrationRegistry> {
        let client = ProviderClient::new(ReqwestConfig::default())?;

        Ok(IntegrationRegistry::new([
            SlackProvider::new(client.clone())
                .with_base_urls(base, base)
                .definition(),
            GithubProvider::new(client.clone())
                .with_base_urls(base, base)
                .definition(),
            ShortcutProvider::new(client.clone())
                .with_api_base(base)
                .definition(),
            SegmentProvider::new(client.clone())
                .with_api_base(base)
                .definition(),
            ZapierProvider::new(client).definition(),
        ]))
    }

    /// Returns a new [`TestContext`] with the state adjusted by `customize`.
    pub async fn create_test_context_with(
        customize: impl FnOnce(ServiceState) -> ServiceState,
    ) -> anyhow::Result<TestContext> {
        let mock = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());

        let config = ServiceConfig::builder()
            .with_state_secret("test-state-secret-value")
            .build()?;
        let state = ServiceState::with_registry(
            &config,
            mock_registry(&mock.uri())?,
            HubStores::in_memory(store.clone()),
        )?;
        let state = customize(state);

        let app: Router = routes(state.clone()).with_state(state);
        let server = TestServer::new(app)?;

        Ok(TestContext {
            server,
            store,
            mock,
        })
    }

    /// Returns a new [`TestContext`] with default state.
    pub async fn create_test_context() -> anyhow::Result<TestContext> {
        create_test_context_with(|state| state).await
    }

    #[tokio::test]
    async fn handlers() -> anyhow::Result<()> {
        let context = create_test_context().await?;
        assert!(context.server.is_running());
        Ok(())
    }

    #[tokio::test]
    async fn unknown_route_is_not_found() -> anyhow::Result<()> {
        let context = create_test_context().await?;

        let response = context.server.get("/nowhere").await;
        response.assert_status_not_found();
        assert_eq!(response.json::<serde_json::Value>()["name"], "not_found");

        Ok(())
    }
}
