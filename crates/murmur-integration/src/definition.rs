//! Integration definitions: identity, catalog metadata and capabilities.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoStaticStr};

use crate::capability::{
    DisconnectCapability, HookCapability, IdentifyCapability, InboundCapability, OAuthCapability,
    SegmentSyncCapability,
};

/// Identifier of every integration the hub knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(Serialize, Deserialize, AsRefStr, Display, EnumString, EnumIter, IntoStaticStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IntegrationType {
    Slack,
    Github,
    Shortcut,
    Segment,
    Zapier,
}

impl IntegrationType {
    /// Metadata key under which this integration's user id is stored.
    pub fn user_id_field(&self) -> String {
        format!("{}UserId", self.as_ref())
    }
}

/// Functional category of an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationCategory {
    /// Chat and notifications.
    Communication,
    /// Issue and project trackers.
    IssueTracking,
    /// Customer data platforms.
    CustomerData,
    /// No-code automation.
    Automation,
}

/// Authentication method used by an integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationAuthType {
    /// OAuth 2.0 authorization code flow.
    #[serde(rename = "oauth2")]
    OAuth2,
    /// Token or key pasted by an admin.
    ApiKey,
    /// Provider-generated webhook URL.
    Webhook,
}

/// Display metadata shown in the catalog.
#[derive(Debug, Clone, Copy)]
pub struct CatalogInfo {
    /// Product name.
    pub name: &'static str,
    /// One-line description.
    pub description: &'static str,
    /// Functional category.
    pub category: IntegrationCategory,
    /// How the workspace authenticates.
    pub auth_type: IntegrationAuthType,
}

/// One admin-editable platform credential field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialField {
    /// Key in the credential map.
    pub key: &'static str,
    /// Form label.
    pub label: &'static str,
    /// Whether the value must be masked.
    pub secret: bool,
}

/// App-level credentials an admin must configure before workspaces connect.
#[derive(Debug, Clone, Copy)]
pub struct PlatformCredentialSpec {
    /// Fields to collect.
    pub fields: &'static [CredentialField],
}

/// Standard OAuth client id / secret pair.
pub const OAUTH_CLIENT_FIELDS: PlatformCredentialSpec = PlatformCredentialSpec {
    fields: &[
        CredentialField {
            key: "clientId",
            label: "Client ID",
            secret: false,
        },
        CredentialField {
            key: "clientSecret",
            label: "Client secret",
            secret: true,
        },
    ],
};

/// User-sync capability bundle.
#[derive(Clone, Default)]
pub struct UserSync {
    /// Inbound identify handler.
    pub identify: Option<Arc<dyn IdentifyCapability>>,
    /// Outbound segment membership sync.
    pub segment_sync: Option<Arc<dyn SegmentSyncCapability>>,
}

/// Everything the hub knows about one integration.
///
/// A definition without capabilities is inert but still listed.
#[derive(Clone)]
pub struct IntegrationDefinition {
    /// Identity.
    pub id: IntegrationType,
    /// Display metadata.
    pub catalog: CatalogInfo,
    /// OAuth flow.
    pub oauth: Option<Arc<dyn OAuthCapability>>,
    /// Outbound hook.
    pub hook: Option<Arc<dyn HookCapability>>,
    /// Inbound status webhooks.
    pub inbound: Option<Arc<dyn InboundCapability>>,
    /// User sync.
    pub user_sync: Option<UserSync>,
    /// Required platform credentials.
    pub platform_credentials: Option<PlatformCredentialSpec>,
    /// Revocation on disconnect.
    pub on_disconnect: Option<Arc<dyn DisconnectCapability>>,
}

impl IntegrationDefinition {
    /// Creates a definition with no capabilities.
    pub fn new(id: IntegrationType, catalog: CatalogInfo) -> Self {
        Self {
            id,
            catalog,
            oauth: None,
            hook: None,
            inbound: None,
            user_sync: None,
            platform_credentials: None,
            on_disconnect: None,
        }
    }

    /// Sets the OAuth capability.
    pub fn with_oauth(mut self, oauth: Arc<dyn OAuthCapability>) -> Self {
        self.oauth = Some(oauth);
        self
    }

    /// Sets the hook capability.
    pub fn with_hook(mut self, hook: Arc<dyn HookCapability>) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Sets the inbound webhook capability.
    pub fn with_inbound(mut self, inbound: Arc<dyn InboundCapability>) -> Self {
        self.inbound = Some(inbound);
        self
    }

    /// Sets the user-sync bundle.
    pub fn with_user_sync(mut self, user_sync: UserSync) -> Self {
        self.user_sync = Some(user_sync);
        self
    }

    /// Declares required platform credentials.
    pub fn with_platform_credentials(mut self, spec: PlatformCredentialSpec) -> Self {
        self.platform_credentials = Some(spec);
        self
    }

    /// Sets the disconnect hook.
    pub fn with_on_disconnect(mut self, on_disconnect: Arc<dyn DisconnectCapability>) -> Self {
        self.on_disconnect = Some(on_disconnect);
        self
    }

    /// Returns the identify handler, if any.
    pub fn identify(&self) -> Option<&Arc<dyn IdentifyCapability>> {
        self.user_sync.as_ref()?.identify.as_ref()
    }

    /// Returns the segment sync handler, if any.
    pub fn segment_sync(&self) -> Option<&Arc<dyn SegmentSyncCapability>> {
        self.user_sync.as_ref()?.segment_sync.as_ref()
    }

    /// Returns whether any capability is present.
    pub fn has_capabilities(&self) -> bool {
        self.oauth.is_some()
            || self.hook.is_some()
            || self.inbound.is_some()
            || self.identify().is_some()
            || self.segment_sync().is_some()
    }

    /// Returns whether the integration accepts pasted credentials.
    pub fn accepts_manual_credentials(&self) -> bool {
        self.oauth.is_none() && self.has_capabilities()
    }
}

impl fmt::Debug for IntegrationDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntegrationDefinition")
            .field("id", &self.id)
            .field("oauth", &self.oauth.is_some())
            .field("hook", &self.hook.is_some())
            .field("inbound", &self.inbound.is_some())
            .field("identify", &self.identify().is_some())
            .field("segment_sync", &self.segment_sync().is_some())
            .field("platform_credentials", &self.platform_credentials.is_some())
            .finish_non_exhaustive()
    }
}
