//! Internal endpoints the domain layer calls after a write.

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use murmur_integration::sync::SyncReport;
use murmur_integration::{DomainEvent, IntegrationHub};

use crate::extract::{Json, Path};
use crate::handler::Result;
use crate::handler::request::{
    SegmentSyncRequest, WorkspacePathParams, WorkspaceSegmentPathParams,
};
use crate::handler::response::EventAccepted;
use crate::service::ServiceState;

/// Tracing target for domain event intake.
const TRACING_TARGET: &str = "murmur_server::handler::events";

/// Queues a domain event for every active hook of the workspace.
///
/// Returns before any provider is called; outcomes are logged and failed
/// retryable deliveries land in the retry queue.
#[tracing::instrument(
    skip_all,
    fields(workspace_id = %path_params.workspace_id)
)]
async fn publish_event(
    State(hub): State<IntegrationHub>,
    Path(path_params): Path<WorkspacePathParams>,
    Json(event): Json<DomainEvent>,
) -> (StatusCode, Json<EventAccepted>) {
    let kind = event.kind();

    // Detached: the request does not wait for providers.
    let _ = hub.dispatcher().spawn(path_params.workspace_id, event);

    tracing::debug!(target: TRACING_TARGET, event = kind, "Domain event accepted");

    (StatusCode::ACCEPTED, Json(EventAccepted { event: kind }))
}

/// Pushes a segment membership delta to every capable connection.
#[tracing::instrument(
    skip_all,
    fields(
        workspace_id = %path_params.workspace_id,
        segment = %path_params.segment,
    )
)]
async fn sync_segment(
    State(hub): State<IntegrationHub>,
    Path(path_params): Path<WorkspaceSegmentPathParams>,
    Json(request): Json<SegmentSyncRequest>,
) -> Result<(StatusCode, Json<SyncReport>)> {
    let report = hub
        .user_sync()
        .notify_user_sync_integrations(
            path_params.workspace_id,
            &path_params.segment,
            &request.added,
            &request.removed,
        )
        .await?;

    tracing::debug!(
        target: TRACING_TARGET,
        skipped = report.skipped,
        pushes = report.outcomes.len(),
        failures = report.failures(),
        "Segment sync finished"
    );

    Ok((StatusCode::OK, Json(report)))
}

/// Returns a [`Router`] with the internal domain routes.
pub fn routes() -> Router<ServiceState> {
    Router::new()
        .route("/api/workspaces/{workspace_id}/events", post(publish_event))
        .route(
            "/api/workspaces/{workspace_id}/segments/{segment}/sync",
            post(sync_segment),
        )
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::http::StatusCode;
    use serde_json::{Value, json};
    use uuid::Uuid;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    use crate::handler::test::create_test_context;

    fn post_created() -> Value {
        json!({
            "type": "post.created",
            "actor": { "principalId": Uuid::now_v7(), "displayName": "Ada" },
            "post": {
                "id": Uuid::now_v7(),
                "title": "Dark mode",
                "content": "Please add a dark theme",
                "url": "https://feedback.example.com/p/dark-mode",
            },
        })
    }

    #[tokio::test]
    async fn event_is_accepted_and_dispatched() -> anyhow::Result<()> {
        let context = create_test_context().await?;
        let workspace_id = Uuid::now_v7();

        Mock::given(method("POST"))
            .and(path("/zapier/catch"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&context.mock)
            .await;

        context
            .server
            .put(&format!("/api/workspaces/{workspace_id}/integrations/zapier"))
            .json(&json!({
                "memberId": Uuid::now_v7(),
                "secrets": { "webhookUrl": format!("{}/zapier/catch", context.mock.uri()) },
            }))
            .await
            .assert_status(StatusCode::CREATED);

        let response = context
            .server
            .post(&format!("/api/workspaces/{workspace_id}/events"))
            .json(&post_created())
            .await;

        response.assert_status(StatusCode::ACCEPTED);
        assert_eq!(response.json::<Value>(), json!({ "event": "post.created" }));

        // Dispatch runs detached from the request.
        for _ in 0..50 {
            let delivered = context.mock.received_requests().await.unwrap_or_default();
            if !delivered.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        Ok(())
    }

    #[tokio::test]
    async fn unknown_event_is_bad_request() -> anyhow::Result<()> {
        let context = create_test_context().await?;

        context
            .server
            .post(&format!("/api/workspaces/{}/events", Uuid::now_v7()))
            .json(&json!({ "type": "post.exploded" }))
            .await
            .assert_status(StatusCode::BAD_REQUEST);

        Ok(())
    }

    #[tokio::test]
    async fn segment_sync_without_connections_is_skipped() -> anyhow::Result<()> {
        let context = create_test_context().await?;

        let response = context
            .server
            .post(&format!("/api/workspaces/{}/segments/vip/sync", Uuid::now_v7()))
            .json(&json!({ "added": [Uuid::now_v7()] }))
            .await;

        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["skipped"], true);

        Ok(())
    }

    #[tokio::test]
    async fn segment_sync_pushes_membership() -> anyhow::Result<()> {
        let context = create_test_context().await?;
        let workspace_id = Uuid::now_v7();
        let principal_id = context
            .store
            .insert_user(workspace_id, "ada@example.com")
            .await;

        Mock::given(method("POST"))
            .and(path("/v1/identify"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
            .expect(1)
            .mount(&context.mock)
            .await;

        context
            .server
            .put(&format!("/api/workspaces/{workspace_id}/integrations/segment"))
            .json(&json!({
                "memberId": Uuid::now_v7(),
                "secrets": { "writeKey": "wk", "webhookSecret": "whsec" },
            }))
            .await
            .assert_status(StatusCode::CREATED);

        let response = context
            .server
            .post(&format!("/api/workspaces/{workspace_id}/segments/vip/sync"))
            .json(&json!({ "added": [principal_id] }))
            .await;

        response.assert_status_ok();
        let report = response.json::<Value>();
        assert_eq!(report["skipped"], false);
        assert_eq!(report["outcomes"][0]["integrationType"], "segment");
        assert_eq!(report["outcomes"][0]["joined"], true);
        assert_eq!(report["outcomes"][0]["users"], 1);
        assert!(report["outcomes"][0].get("error").is_none());

        Ok(())
    }
}
