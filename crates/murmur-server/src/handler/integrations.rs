//! Workspace connection management: catalog, manual credentials, removal.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, patch, put};
use murmur_integration::{CatalogEntry, IntegrationHub};

use crate::extract::{Json, Path};
use crate::handler::request::{
    ManualConnection, SecretsUpdate, WorkspaceIntegrationPathParams, WorkspacePathParams,
};
use crate::handler::response::Connection;
use crate::handler::{Result, parse_integration_type};
use crate::service::ServiceState;

/// Tracing target for connection management.
const TRACING_TARGET: &str = "murmur_server::handler::integrations";

/// Lists every integration with its availability.
#[tracing::instrument(
    skip_all,
    fields(workspace_id = %path_params.workspace_id)
)]
async fn list_catalog(
    State(hub): State<IntegrationHub>,
    Path(path_params): Path<WorkspacePathParams>,
) -> Result<(StatusCode, Json<Vec<CatalogEntry>>)> {
    let catalog = hub.catalog().await?;

    tracing::debug!(
        target: TRACING_TARGET,
        entry_count = catalog.len(),
        "Catalog listed"
    );

    Ok((StatusCode::OK, Json(catalog)))
}

/// Connects an integration with admin-entered credentials.
#[tracing::instrument(
    skip_all,
    fields(
        workspace_id = %path_params.workspace_id,
        integration_type = %path_params.integration_type,
    )
)]
async fn connect_manual(
    State(hub): State<IntegrationHub>,
    Path(path_params): Path<WorkspaceIntegrationPathParams>,
    Json(request): Json<ManualConnection>,
) -> Result<(StatusCode, Json<Connection>)> {
    let integration_type = parse_integration_type(&path_params.integration_type)?;

    tracing::debug!(
        target: TRACING_TARGET,
        member_id = %request.member_id,
        config_keys = request.config.len(),
        secret_keys = request.secrets.len(),
        "Storing manual credentials"
    );

    let connection = hub
        .oauth()
        .connect_manual(
            path_params.workspace_id,
            request.member_id,
            integration_type,
            request.config,
            request.secrets,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(connection.into())))
}

/// Adds secrets to an existing connection, such as the webhook signing
/// secret of an OAuth connection.
#[tracing::instrument(
    skip_all,
    fields(
        workspace_id = %path_params.workspace_id,
        integration_type = %path_params.integration_type,
    )
)]
async fn update_secrets(
    State(hub): State<IntegrationHub>,
    Path(path_params): Path<WorkspaceIntegrationPathParams>,
    Json(request): Json<SecretsUpdate>,
) -> Result<(StatusCode, Json<Connection>)> {
    let integration_type = parse_integration_type(&path_params.integration_type)?;

    tracing::debug!(
        target: TRACING_TARGET,
        secret_keys = request.secrets.len(),
        "Updating connection secrets"
    );

    let connection = hub
        .oauth()
        .update_secrets(path_params.workspace_id, integration_type, request.secrets)
        .await?;

    Ok((StatusCode::OK, Json(connection.into())))
}

/// Disconnects an integration.
#[tracing::instrument(
    skip_all,
    fields(
        workspace_id = %path_params.workspace_id,
        integration_type = %path_params.integration_type,
    )
)]
async fn disconnect(
    State(hub): State<IntegrationHub>,
    Path(path_params): Path<WorkspaceIntegrationPathParams>,
) -> Result<StatusCode> {
    let integration_type = parse_integration_type(&path_params.integration_type)?;

    hub.oauth()
        .disconnect(path_params.workspace_id, integration_type)
        .await?;

    tracing::debug!(target: TRACING_TARGET, "Integration disconnected");

    Ok(StatusCode::NO_CONTENT)
}

/// Returns a [`Router`] with the connection management routes.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .route(
            "/api/workspaces/{workspace_id}/integrations/catalog",
            get(list_catalog),
        )
        .route(
            "/api/workspaces/{workspace_id}/integrations/{integration_type}",
            put(connect_manual).delete(disconnect),
        )
        .route(
            "/api/workspaces/{workspace_id}/integrations/{integration_type}/secrets",
            patch(update_secrets),
        )
}
