//! Body limits and response hardening headers.

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::http::header::{self, HeaderValue};
#[cfg(feature = "config")]
use clap::Args;
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::set_header::SetResponseHeaderLayer;

/// Default maximum request body size: 1MB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

/// Request size limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "config", derive(Args))]
#[must_use = "config does nothing unless you use it"]
pub struct SecurityConfig {
    /// Maximum accepted request body in bytes
    #[cfg_attr(
        feature = "config",
        arg(long, env = "MAX_BODY_SIZE", default_value_t = DEFAULT_MAX_BODY_SIZE)
    )]
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

/// Extension trait for `axum::`[`Router`] to apply security middleware.
pub trait RouterSecurityExt<S> {
    /// Limits request bodies and sets hardening response headers.
    fn with_security(self, config: &SecurityConfig) -> Self;

    /// Layers security middleware with the default limits.
    fn with_default_security(self) -> Self;
}

impl<S> RouterSecurityExt<S> for Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_security(self, config: &SecurityConfig) -> Self {
        self.layer(DefaultBodyLimit::max(config.max_body_size))
            .layer(RequestBodyLimitLayer::new(config.max_body_size))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::X_FRAME_OPTIONS,
                HeaderValue::from_static("DENY"),
            ))
            .layer(SetResponseHeaderLayer::overriding(
                header::REFERRER_POLICY,
                HeaderValue::from_static("no-referrer"),
            ))
    }

    fn with_default_security(self) -> Self {
        self.with_security(&SecurityConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::post;
    use axum_test::TestServer;

    use super::*;

    #[tokio::test]
    async fn test_oversized_body_is_rejected() -> anyhow::Result<()> {
        let router: Router = Router::new()
            .route("/", post(|body: axum::body::Bytes| async move { body.len().to_string() }))
            .with_security(&SecurityConfig { max_body_size: 16 });

        let server = TestServer::new(router)?;
        server
            .post("/")
            .bytes(vec![0u8; 8].into())
            .await
            .assert_status_ok();
        server
            .post("/")
            .bytes(vec![0u8; 64].into())
            .await
            .assert_status(axum::http::StatusCode::PAYLOAD_TOO_LARGE);

        Ok(())
    }
}
