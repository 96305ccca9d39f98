//! Connection lifecycle: authorize, exchange, manual entry and disconnect.

use std::sync::Arc;

use jiff::Timestamp;
use murmur_core::crypto::SecretsCodec;
use murmur_core::{Error, Result};
use url::Url;
use uuid::Uuid;

use super::TRACING_TARGET;
use super::state::StateSigner;
use crate::capability::PlatformCredentials;
use crate::connection::{ConfigMap, IntegrationConnection, SecretMap};
use crate::definition::{IntegrationDefinition, IntegrationType};
use crate::registry::IntegrationRegistry;
use crate::store::{ConnectionStore, PlatformCredentialStore};

/// Secret keys written by an authorization code exchange.
const TOKEN_SECRET_KEYS: [&str; 3] = ["accessToken", "refreshToken", "expiresAt"];

/// Drives OAuth connections and their removal.
#[derive(Clone)]
pub struct OAuthManager {
    registry: Arc<IntegrationRegistry>,
    signer: Arc<StateSigner>,
    codec: SecretsCodec,
    connections: Arc<dyn ConnectionStore>,
    credentials: Arc<dyn PlatformCredentialStore>,
}

impl OAuthManager {
    /// Creates a new manager.
    pub fn new(
        registry: Arc<IntegrationRegistry>,
        signer: Arc<StateSigner>,
        codec: SecretsCodec,
        connections: Arc<dyn ConnectionStore>,
        credentials: Arc<dyn PlatformCredentialStore>,
    ) -> Self {
        Self {
            registry,
            signer,
            codec,
            connections,
            credentials,
        }
    }

    fn definition(&self, integration_type: IntegrationType) -> Result<&IntegrationDefinition> {
        self.registry.get(integration_type).ok_or_else(|| {
            Error::not_found().with_message(format!("unknown integration `{integration_type}`"))
        })
    }

    /// Loads platform credentials, failing when the definition requires them
    /// and none are configured.
    async fn platform_credentials(
        &self,
        definition: &IntegrationDefinition,
    ) -> Result<Option<PlatformCredentials>> {
        let credentials = self.credentials.get(definition.id).await?;

        if definition.platform_credentials.is_some() && credentials.is_none() {
            tracing::warn!(
                target: TRACING_TARGET,
                integration_type = %definition.id,
                "Platform credentials are not configured"
            );
            return Err(Error::configuration()
                .with_message(format!(
                    "{} is not available until an admin configures its platform credentials",
                    definition.catalog.name
                ))
                .with_context(definition.id.as_ref().to_owned()));
        }

        Ok(credentials)
    }

    /// Builds the provider authorization URL carrying a fresh signed state.
    #[tracing::instrument(skip_all, fields(integration_type = %integration_type, workspace_id = %workspace_id))]
    pub async fn build_auth_url(
        &self,
        integration_type: IntegrationType,
        workspace_id: Uuid,
        member_id: Uuid,
        redirect_uri: &str,
        fields: ConfigMap,
    ) -> Result<Url> {
        let definition = self.definition(integration_type)?;
        let oauth = definition.oauth.as_ref().ok_or_else(|| {
            Error::not_found().with_message(format!("{integration_type} does not support OAuth"))
        })?;

        let credentials = self.platform_credentials(definition).await?;
        let state = self
            .signer
            .sign(integration_type, workspace_id, member_id, fields.clone())?;

        let url = oauth.authorization_url(&state, redirect_uri, &fields, credentials.as_ref())?;

        tracing::debug!(
            target: TRACING_TARGET,
            host = url.host_str().unwrap_or_default(),
            "Built authorization URL"
        );

        Ok(url)
    }

    /// Verifies the callback state, exchanges the code and stores the connection.
    #[tracing::instrument(skip_all, fields(integration_type = %integration_type))]
    pub async fn complete_callback(
        &self,
        integration_type: IntegrationType,
        code: &str,
        state: &str,
        redirect_uri: &str,
    ) -> Result<IntegrationConnection> {
        let state = self.signer.verify(state, integration_type)?;
        let definition = self.definition(integration_type)?;
        let oauth = definition.oauth.as_ref().ok_or_else(|| {
            Error::not_found().with_message(format!("{integration_type} does not support OAuth"))
        })?;

        let credentials = self.platform_credentials(definition).await?;
        let grant = oauth
            .exchange_code(code, redirect_uri, &state.fields, credentials.as_ref())
            .await
            .inspect_err(|error| {
                tracing::warn!(
                    target: TRACING_TARGET,
                    workspace_id = %state.workspace_id,
                    error = %error,
                    "Authorization code exchange failed"
                );
            })?;

        let (secrets, discovered) = grant.into_parts(Timestamp::now());
        let mut config = state.fields;
        config.extend(discovered);

        let connection = self
            .store(
                state.workspace_id,
                integration_type,
                Some(state.member_id),
                config,
                &secrets,
            )
            .await?;

        tracing::info!(
            target: TRACING_TARGET,
            workspace_id = %connection.workspace_id,
            connection_id = %connection.id,
            "Integration connected"
        );

        Ok(connection)
    }

    /// Stores admin-entered credentials for integrations without OAuth.
    #[tracing::instrument(skip_all, fields(integration_type = %integration_type, workspace_id = %workspace_id))]
    pub async fn connect_manual(
        &self,
        workspace_id: Uuid,
        member_id: Uuid,
        integration_type: IntegrationType,
        config: ConfigMap,
        secrets: SecretMap,
    ) -> Result<IntegrationConnection> {
        let definition = self.definition(integration_type)?;
        if !definition.accepts_manual_credentials() {
            return Err(Error::configuration().with_message(format!(
                "{} must be connected through OAuth",
                definition.catalog.name
            )));
        }

        self.platform_credentials(definition).await?;

        let connection = self
            .store(workspace_id, integration_type, Some(member_id), config, &secrets)
            .await?;

        tracing::info!(
            target: TRACING_TARGET,
            connection_id = %connection.id,
            "Integration connected with manual credentials"
        );

        Ok(connection)
    }

    /// Merges extra secrets into an existing connection.
    ///
    /// OAuth connections receive their webhook signing secret this way. Keys
    /// written by the token exchange cannot be overwritten.
    #[tracing::instrument(skip_all, fields(integration_type = %integration_type, workspace_id = %workspace_id))]
    pub async fn update_secrets(
        &self,
        workspace_id: Uuid,
        integration_type: IntegrationType,
        secrets: SecretMap,
    ) -> Result<IntegrationConnection> {
        if let Some(key) = secrets.keys().find(|key| TOKEN_SECRET_KEYS.contains(&key.as_str())) {
            return Err(Error::invalid_input()
                .with_message(format!("secret `{key}` is managed by the token exchange")));
        }

        let mut connection = self
            .connections
            .find(workspace_id, integration_type)
            .await?
            .ok_or_else(|| {
                Error::not_found()
                    .with_message(format!("{integration_type} is not connected"))
                    .with_context("connection")
            })?;

        let mut merged = self.codec.open(workspace_id, &connection.secrets)?;
        let updated_keys = secrets.len();
        merged.extend(secrets);
        connection.secrets = self.codec.seal(workspace_id, &merged)?;

        let connection = self.connections.upsert(connection).await?;

        tracing::info!(
            target: TRACING_TARGET,
            connection_id = %connection.id,
            updated_keys,
            "Connection secrets updated"
        );

        Ok(connection)
    }

    async fn store(
        &self,
        workspace_id: Uuid,
        integration_type: IntegrationType,
        member_id: Option<Uuid>,
        config: ConfigMap,
        secrets: &SecretMap,
    ) -> Result<IntegrationConnection> {
        let sealed = self.codec.seal(workspace_id, secrets)?;
        let connection =
            IntegrationConnection::new(workspace_id, integration_type, member_id, config, sealed);
        self.connections.upsert(connection).await
    }

    /// Removes a connection, revoking the external token on a best-effort basis.
    ///
    /// Local deletion happens whatever the revoke outcome.
    #[tracing::instrument(skip_all, fields(integration_type = %integration_type, workspace_id = %workspace_id))]
    pub async fn disconnect(
        &self,
        workspace_id: Uuid,
        integration_type: IntegrationType,
    ) -> Result<()> {
        let connection = self
            .connections
            .find(workspace_id, integration_type)
            .await?
            .ok_or_else(|| {
                Error::not_found()
                    .with_message(format!("{integration_type} is not connected"))
                    .with_context("connection")
            })?;

        if let Some(on_disconnect) = self
            .registry
            .get(integration_type)
            .and_then(|definition| definition.on_disconnect.as_ref())
        {
            let revoked: Result<()> = async {
                let secrets = self.codec.open(workspace_id, &connection.secrets)?;
                let credentials = self.credentials.get(integration_type).await?;
                on_disconnect
                    .on_disconnect(&secrets, &connection.config, credentials.as_ref())
                    .await
            }
            .await;

            if let Err(error) = revoked {
                tracing::warn!(
                    target: TRACING_TARGET,
                    connection_id = %connection.id,
                    error = %error,
                    "Token revocation failed, deleting connection anyway"
                );
            }
        }

        self.connections.delete(connection.id).await?;

        tracing::info!(
            target: TRACING_TARGET,
            connection_id = %connection.id,
            "Integration disconnected"
        );

        Ok(())
    }
}
