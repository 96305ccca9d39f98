//! Liveness endpoint.

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;

use crate::extract::Json;
use crate::handler::response::HealthStatus;
use crate::service::ServiceState;

/// Reports that the process is serving requests.
async fn health_status() -> (StatusCode, Json<HealthStatus>) {
    (StatusCode::OK, Json(HealthStatus::default()))
}

/// Returns a [`Router`] with the monitoring routes.
pub fn routes() -> Router<ServiceState> {
    Router::new().route("/health", get(health_status))
}
