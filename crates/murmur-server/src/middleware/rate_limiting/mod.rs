//! Rate limiting middleware for provider-facing endpoints.

mod by_integration;

pub use by_integration::{rate_limit_inbound, rate_limit_oauth};
