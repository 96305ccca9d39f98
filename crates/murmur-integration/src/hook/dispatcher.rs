//! Parallel, isolated delivery of one event to many connections.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use jiff::Timestamp;
use murmur_core::Result;
use murmur_core::crypto::SecretsCodec;
use murmur_webhook::HookResult;
use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::TRACING_TARGET;
use crate::capability::{HookCapability, HookTarget};
use crate::connection::IntegrationConnection;
use crate::definition::IntegrationType;
use crate::event::DomainEvent;
use crate::registry::IntegrationRegistry;
use crate::store::{ConnectionStore, RetryJob, RetryQueue};

/// What happened to one connection for one event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    /// Connection the event was delivered to.
    pub connection_id: Uuid,
    /// Integration of that connection.
    pub integration_type: IntegrationType,
    /// Hook result.
    pub result: HookResult,
}

/// Routes domain events to hooks and records failures.
#[derive(Clone)]
pub struct HookDispatcher {
    registry: Arc<IntegrationRegistry>,
    codec: SecretsCodec,
    connections: Arc<dyn ConnectionStore>,
    retry_queue: Arc<dyn RetryQueue>,
}

impl HookDispatcher {
    /// Creates a new dispatcher.
    pub fn new(
        registry: Arc<IntegrationRegistry>,
        codec: SecretsCodec,
        connections: Arc<dyn ConnectionStore>,
        retry_queue: Arc<dyn RetryQueue>,
    ) -> Self {
        Self {
            registry,
            codec,
            connections,
            retry_queue,
        }
    }

    /// Delivers `event` to every active hook-capable connection of the
    /// workspace and waits for all of them.
    ///
    /// Connections run concurrently; a failure or panic in one never affects
    /// another.
    #[tracing::instrument(skip_all, fields(workspace_id = %workspace_id, event = event.kind()))]
    pub async fn dispatch(
        &self,
        workspace_id: Uuid,
        event: &DomainEvent,
    ) -> Result<Vec<DispatchOutcome>> {
        let connections = self.connections.list_active(workspace_id).await?;

        let deliveries = connections.into_iter().filter_map(|connection| {
            let hook = self
                .registry
                .get(connection.integration_type)?
                .hook
                .clone()?;
            Some(self.deliver(hook, connection, event))
        });

        let outcomes = join_all(deliveries).await;

        tracing::debug!(
            target: TRACING_TARGET,
            deliveries = outcomes.len(),
            failed = outcomes.iter().filter(|o| !o.result.success).count(),
            "Event dispatched"
        );

        Ok(outcomes)
    }

    /// Dispatches on a detached task.
    pub fn spawn(&self, workspace_id: Uuid, event: DomainEvent) -> JoinHandle<Vec<DispatchOutcome>> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            match dispatcher.dispatch(workspace_id, &event).await {
                Ok(outcomes) => outcomes,
                Err(error) => {
                    tracing::error!(
                        target: TRACING_TARGET,
                        workspace_id = %workspace_id,
                        event = event.kind(),
                        error = %error,
                        "Failed to load connections for dispatch"
                    );
                    Vec::new()
                }
            }
        })
    }

    async fn deliver(
        &self,
        hook: Arc<dyn HookCapability>,
        connection: IntegrationConnection,
        event: &DomainEvent,
    ) -> DispatchOutcome {
        let result = match self.codec.open(connection.workspace_id, &connection.secrets) {
            Ok(secrets) => {
                let target = HookTarget {
                    connection_id: connection.id,
                    workspace_id: connection.workspace_id,
                    secrets,
                };

                AssertUnwindSafe(hook.run(event, &target, &connection.config))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| HookResult::failure("hook panicked", false))
            }
            Err(error) => HookResult::failure(format!("cannot open secrets: {error}"), false),
        };

        self.record(&connection, event, &result).await;

        DispatchOutcome {
            connection_id: connection.id,
            integration_type: connection.integration_type,
            result,
        }
    }

    /// Flags fatal failures and queues transient ones.
    async fn record(
        &self,
        connection: &IntegrationConnection,
        event: &DomainEvent,
        result: &HookResult,
    ) {
        if result.success {
            tracing::debug!(
                target: TRACING_TARGET,
                integration_type = %connection.integration_type,
                connection_id = %connection.id,
                external_id = result.external_id.as_deref(),
                "Hook delivered"
            );
            return;
        }

        let reason = result.error.clone().unwrap_or_else(|| "hook failed".into());
        let should_retry = result.is_retryable();

        tracing::warn!(
            target: TRACING_TARGET,
            integration_type = %connection.integration_type,
            connection_id = %connection.id,
            should_retry,
            error = %reason,
            "Hook failed"
        );

        let recorded = if should_retry {
            self.retry_queue
                .enqueue(RetryJob {
                    connection_id: connection.id,
                    workspace_id: connection.workspace_id,
                    integration_type: connection.integration_type,
                    event: event.clone(),
                    attempt: 1,
                    reason,
                    enqueued_at: Timestamp::now(),
                })
                .await
        } else {
            self.connections.mark_error(connection.id, &reason).await
        };

        if let Err(error) = recorded {
            tracing::error!(
                target: TRACING_TARGET,
                connection_id = %connection.id,
                error = %error,
                "Failed to record hook failure"
            );
        }
    }
}
