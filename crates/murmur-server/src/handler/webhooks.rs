//! Provider-facing inbound endpoints.
//!
//! Both routes hand the raw body to the hub untouched: signatures are
//! computed over the exact bytes the provider sent.

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::middleware::from_fn_with_state;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use murmur_integration::IntegrationHub;
use murmur_webhook::{InboundRequest, InboundResponse};

use crate::extract::{ClientAddr, Json, Path, Query};
use crate::handler::request::{InboundQuery, IntegrationPathParams};
use crate::middleware::rate_limit_inbound;
use crate::service::ServiceState;

/// Tracing target for inbound webhook operations.
const TRACING_TARGET: &str = "murmur_server::handler::webhooks";

/// Renders a hub response as returned to the provider.
fn into_response(response: InboundResponse) -> Response {
    (response.status, Json(response.body)).into_response()
}

/// Receives a status-change webhook.
#[tracing::instrument(
    skip_all,
    fields(
        integration_type = %path_params.integration_type,
        client = %client,
    )
)]
async fn receive_webhook(
    State(hub): State<IntegrationHub>,
    Path(path_params): Path<IntegrationPathParams>,
    Query(query): Query<InboundQuery>,
    client: ClientAddr,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    tracing::debug!(
        target: TRACING_TARGET,
        body_len = body.len(),
        "Inbound webhook received"
    );

    let response = hub
        .gateway()
        .handle(
            &path_params.integration_type,
            query.workspace_id,
            InboundRequest::new(headers, body),
        )
        .await;

    tracing::debug!(
        target: TRACING_TARGET,
        status = response.status.as_u16(),
        "Inbound webhook answered"
    );

    into_response(response)
}

/// Receives an identify call from a customer data platform.
#[tracing::instrument(
    skip_all,
    fields(
        integration_type = %path_params.integration_type,
        client = %client,
    )
)]
async fn receive_identify(
    State(hub): State<IntegrationHub>,
    Path(path_params): Path<IntegrationPathParams>,
    Query(query): Query<InboundQuery>,
    client: ClientAddr,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let response = hub
        .user_sync()
        .handle_inbound_identify(
            &path_params.integration_type,
            query.workspace_id,
            InboundRequest::new(headers, body),
        )
        .await;

    tracing::debug!(
        target: TRACING_TARGET,
        status = response.status.as_u16(),
        "Identify call answered"
    );

    into_response(response)
}

/// Returns a [`Router`] with the inbound routes, rate limited per
/// integration and client.
pub fn routes(state: ServiceState) -> Router<ServiceState> {
    Router::new()
        .route(
            "/api/integrations/{integration_type}/webhook",
            post(receive_webhook),
        )
        .route(
            "/api/integrations/{integration_type}/identify",
            post(receive_identify),
        )
        .route_layer(from_fn_with_state(state, rate_limit_inbound))
}
