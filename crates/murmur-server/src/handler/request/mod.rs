//! Request types for HTTP handlers.

mod integrations;
mod oauth;
mod paths;
mod segments;

pub use integrations::{ManualConnection, SecretsUpdate};
pub use oauth::{CallbackQuery, ConnectQuery};
pub use paths::{
    InboundQuery, IntegrationPathParams, WorkspaceIntegrationPathParams, WorkspacePathParams,
    WorkspaceSegmentPathParams,
};
pub use segments::SegmentSyncRequest;
