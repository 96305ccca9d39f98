//! Reqwest-based HTTP client shared by integration providers.

use std::sync::Arc;

use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;

use super::{Error, ReqwestConfig, TRACING_TARGET};
use crate::outcome::{HookResult, error_kind_for_status};

/// Longest body excerpt carried into error messages.
const MAX_DETAIL_LEN: usize = 200;

/// Inner client that holds the HTTP client and configuration.
struct ProviderClientInner {
    http: Client,
    config: ReqwestConfig,
}

/// HTTP client used by every provider to reach its REST API.
///
/// Cheap to clone; all clones share one connection pool.
#[derive(Clone)]
pub struct ProviderClient {
    inner: Arc<ProviderClientInner>,
}

impl std::fmt::Debug for ProviderClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderClient")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl ProviderClient {
    /// Creates a new provider client with the given configuration.
    pub fn new(config: ReqwestConfig) -> murmur_core::Result<Self> {
        let timeout = config.effective_timeout();
        let user_agent = config.effective_user_agent();

        tracing::debug!(
            target: TRACING_TARGET,
            timeout_ms = timeout.as_millis(),
            "Creating provider client"
        );

        let http = Client::builder()
            .timeout(timeout)
            .user_agent(&user_agent)
            .build()
            .map_err(|e| {
                murmur_core::Error::configuration()
                    .with_message("Failed to create HTTP client")
                    .with_source(e)
            })?;

        Ok(Self {
            inner: Arc::new(ProviderClientInner { http, config }),
        })
    }

    /// Gets the underlying HTTP client for building requests.
    pub fn http(&self) -> &Client {
        &self.inner.http
    }

    /// Gets the client configuration.
    pub fn config(&self) -> &ReqwestConfig {
        &self.inner.config
    }

    /// Sends a request and reads the body as JSON.
    ///
    /// Non-2xx statuses are returned as a [`ProviderResponse`], not an error;
    /// only transport failures are `Err`. Bodies that are not JSON are kept
    /// as a string.
    pub async fn send(&self, request: RequestBuilder) -> murmur_core::Result<ProviderResponse> {
        let response = request.send().await.map_err(Error::from)?;
        let status = response.status();
        let url = response.url().clone();
        let bytes = response.bytes().await.map_err(Error::from)?;

        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };

        tracing::debug!(
            target: TRACING_TARGET,
            url = %url.path(),
            status = status.as_u16(),
            "Provider request completed"
        );

        Ok(ProviderResponse { status, body })
    }
}

/// Status and decoded body of a provider response.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// JSON body, `Null` when empty.
    pub body: Value,
}

impl ProviderResponse {
    /// Returns whether the provider answered with 2xx.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Extracts a short human-readable reason from the body.
    pub fn detail(&self) -> String {
        let detail = match &self.body {
            Value::Null => String::new(),
            Value::String(text) => text.clone(),
            body => ["message", "error_description", "error"]
                .iter()
                .find_map(|key| body.get(key).and_then(Value::as_str))
                .map(str::to_owned)
                .unwrap_or_else(|| body.to_string()),
        };

        detail.chars().take(MAX_DETAIL_LEN).collect()
    }

    /// Converts a failed response into a classified hook failure.
    pub fn hook_failure(&self) -> HookResult {
        HookResult::from_status(self.status, self.detail())
    }

    /// Returns `self` on 2xx, otherwise an error whose kind mirrors the status.
    pub fn error_for_status(self, provider: &'static str) -> murmur_core::Result<Self> {
        if self.is_success() {
            return Ok(self);
        }

        Err(murmur_core::Error::new(error_kind_for_status(self.status))
            .with_message(format!(
                "{provider} responded with {}: {}",
                self.status,
                self.detail()
            ))
            .with_context(provider))
    }
}
