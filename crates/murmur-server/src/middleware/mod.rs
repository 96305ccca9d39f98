//! Middleware for `axum::Router` and HTTP request processing.
//!
//! - Recovery: panics, timeouts and tower errors become JSON errors
//! - Observability: request ids, tracing spans and header redaction
//! - Security: body limits and hardening headers
//! - Rate limiting: per integration and client
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use axum::Router;
//! use murmur_server::middleware::{
//!     RecoveryConfig, RouterObservabilityExt, RouterRecoveryExt, RouterSecurityExt,
//! };
//!
//! let app: Router = Router::new()
//!     .with_default_security()
//!     .with_observability()
//!     .with_recovery(&RecoveryConfig::default());
//! ```

mod observability;
mod rate_limiting;
mod recovery;
mod security;

pub use observability::RouterObservabilityExt;
pub use rate_limiting::{rate_limit_inbound, rate_limit_oauth};
pub use recovery::{RecoveryConfig, RouterRecoveryExt};
pub use security::{DEFAULT_MAX_BODY_SIZE, RouterSecurityExt, SecurityConfig};
