//! Application state and dependency injection.

use std::sync::Arc;

use murmur_integration::providers;
use murmur_integration::{HubStores, IntegrationHub, IntegrationRegistry};

use crate::service::{RateLimiter, Result, ServiceConfig, ServiceUrls, TRACING_TARGET};

/// Application state.
///
/// Used for the [`State`] extraction (dependency injection).
///
/// [`State`]: axum::extract::State
#[must_use = "state does nothing unless you use it"]
#[derive(Clone)]
pub struct ServiceState {
    hub: IntegrationHub,
    rate_limiter: RateLimiter,
    urls: Arc<ServiceUrls>,
}

impl ServiceState {
    /// Initializes application state with every shipped integration.
    pub fn from_config(config: &ServiceConfig, stores: HubStores) -> Result<Self> {
        let registry = providers::registry(config.provider_client()?);
        Self::with_registry(config, registry, stores)
    }

    /// Initializes application state around a custom registry.
    pub fn with_registry(
        config: &ServiceConfig,
        registry: IntegrationRegistry,
        stores: HubStores,
    ) -> Result<Self> {
        config.validate()?;

        let hub = IntegrationHub::new(
            registry,
            config.load_secrets_codec()?,
            config.state_signer(),
            stores,
        );

        tracing::info!(
            target: TRACING_TARGET,
            public_url = %config.public_url,
            state_ttl_secs = config.state_ttl_secs,
            "Service state initialized"
        );

        Ok(Self {
            hub,
            rate_limiter: RateLimiter::new(config.rate_limit),
            urls: Arc::new(config.urls()?),
        })
    }

    /// Replaces the rate limiter.
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }
}

macro_rules! impl_di {
    ($($f:ident: $t:ty),+) => {$(
        impl axum::extract::FromRef<ServiceState> for $t {
            fn from_ref(state: &ServiceState) -> Self {
                state.$f.clone()
            }
        }
    )+};
}

impl_di!(hub: IntegrationHub);
impl_di!(rate_limiter: RateLimiter);
impl_di!(urls: Arc<ServiceUrls>);
