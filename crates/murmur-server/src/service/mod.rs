//! Application state and dependency injection.

mod config;
mod security;
mod service_state;
mod urls;

pub use crate::service::config::{ServiceConfig, ServiceConfigBuilder};
pub use crate::service::security::{
    Clock, RateLimitConfig, RateLimitKey, RateLimiter, SystemClock,
};
#[cfg(test)]
pub(crate) use crate::service::security::ManualClock;
pub use crate::service::service_state::ServiceState;
pub use crate::service::urls::ServiceUrls;
// Re-export error types from crate root for convenience
pub use crate::{Error, Result};

/// Tracing target for service construction.
pub(crate) const TRACING_TARGET: &str = "murmur_server::service";
