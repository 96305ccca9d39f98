//! Per-integration, per-client rate limiting.

use std::str::FromStr;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use murmur_integration::IntegrationType;

use crate::extract::{ClientAddr, Path};
use crate::handler::request::IntegrationPathParams;
use crate::service::{RateLimitKey, RateLimiter};

/// Rate limits inbound webhook and identify calls.
///
/// Buckets are keyed by the raw `{integration_type}` segment and the client
/// address, so a noisy provider cannot starve the others.
///
/// # Example
///
/// ```rust,ignore
/// use axum::middleware::from_fn_with_state;
/// use murmur_server::middleware::rate_limit_inbound;
///
/// let router = router.route_layer(from_fn_with_state(state.clone(), rate_limit_inbound));
/// ```
pub async fn rate_limit_inbound(
    State(rate_limiter): State<RateLimiter>,
    Path(params): Path<IntegrationPathParams>,
    client: ClientAddr,
    request: Request,
    next: Next,
) -> Response {
    let key = RateLimitKey::inbound(params.integration_type, client.0);

    match rate_limiter.check(key).await {
        Ok(()) => next.run(request).await,
        Err(error) => error.into_response(),
    }
}

/// Rate limits OAuth connect and callback requests.
///
/// Unknown integration names pass through and are rejected by the handler.
pub async fn rate_limit_oauth(
    State(rate_limiter): State<RateLimiter>,
    Path(params): Path<IntegrationPathParams>,
    client: ClientAddr,
    request: Request,
    next: Next,
) -> Response {
    let Ok(integration_type) = IntegrationType::from_str(&params.integration_type) else {
        return next.run(request).await;
    };

    let key = RateLimitKey::oauth(integration_type, client.0);
    match rate_limiter.check(key).await {
        Ok(()) => next.run(request).await,
        Err(error) => error.into_response(),
    }
}
