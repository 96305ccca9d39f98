//! Concrete integrations shipped with the hub.

mod github;
mod segment;
mod shortcut;
mod slack;
mod zapier;

use murmur_core::{Error, Result};
use murmur_webhook::HookResult;
use murmur_webhook::reqwest::{ProviderClient, ProviderResponse};
use url::Url;

pub use self::github::GithubProvider;
pub use self::segment::SegmentProvider;
pub use self::shortcut::ShortcutProvider;
pub use self::slack::SlackProvider;
pub use self::zapier::ZapierProvider;
use crate::registry::IntegrationRegistry;

/// Tracing target for provider implementations.
pub const TRACING_TARGET: &str = "murmur_integration::providers";

/// Builds the registry of every shipped integration against the public
/// provider endpoints.
pub fn registry(client: ProviderClient) -> IntegrationRegistry {
    IntegrationRegistry::new([
        SlackProvider::new(client.clone()).definition(),
        GithubProvider::new(client.clone()).definition(),
        ShortcutProvider::new(client.clone()).definition(),
        SegmentProvider::new(client.clone()).definition(),
        ZapierProvider::new(client).definition(),
    ])
}

/// Joins a base URL and a path.
fn endpoint(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Builds an authorization URL with query parameters.
fn authorize_url(base: &str, path: &str, params: &[(&str, &str)]) -> Result<Url> {
    Url::parse_with_params(&endpoint(base, path), params).map_err(|e| {
        Error::configuration()
            .with_message("Invalid authorization endpoint")
            .with_source(e)
    })
}

/// Turns a provider call into a hook result, classifying failures.
fn into_hook_result(
    response: Result<ProviderResponse>,
    on_success: impl FnOnce(&ProviderResponse) -> HookResult,
) -> HookResult {
    match response {
        Ok(response) if response.is_success() => on_success(&response),
        Ok(response) => response.hook_failure(),
        Err(error) => HookResult::from_error(&error),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use murmur_webhook::reqwest::ReqwestConfig;

    use super::*;

    pub fn client() -> ProviderClient {
        ProviderClient::new(ReqwestConfig::default().with_timeout(2)).unwrap()
    }

    /// Registry whose providers all talk to `base`.
    pub fn test_registry(base: &str) -> IntegrationRegistry {
        let client = client();
        IntegrationRegistry::new([
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
        ])
    }

    #[test]
    fn test_endpoint_joins_cleanly() {
        assert_eq!(
            endpoint("https://slack.com/api/", "/chat.postMessage"),
            "https://slack.com/api/chat.postMessage"
        );
    }

    #[test]
    fn test_every_type_is_registered() {
        use strum::IntoEnumIterator;

        let registry = registry(client());
        for integration_type in crate::definition::IntegrationType::iter() {
            assert!(registry.get(integration_type).is_some());
        }
    }
}
