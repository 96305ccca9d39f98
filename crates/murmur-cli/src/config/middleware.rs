//! Middleware configuration for the HTTP server.

use clap::Args;
use murmur_server::middleware::{RecoveryConfig, SecurityConfig};
use serde::{Deserialize, Serialize};

use crate::TRACING_TARGET_CONFIG;

/// Middleware configuration combining body limits and recovery settings.
#[derive(Debug, Clone, Default, Args, Serialize, Deserialize)]
pub struct MiddlewareConfig {
    /// Request size limits.
    #[clap(flatten)]
    pub security: SecurityConfig,

    /// Request timeout and panic recovery.
    #[clap(flatten)]
    pub recovery: RecoveryConfig,
}

impl MiddlewareConfig {
    /// Logs middleware configuration at info level.
    pub fn log(&self) {
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            max_body_size = self.security.max_body_size,
            request_timeout_secs = self.recovery.request_timeout,
            "Middleware configuration"
        );
    }
}
