//! Provider webhooks that report status changes on linked posts.

mod gateway;

pub use gateway::InboundGateway;

/// Tracing target for inbound webhooks.
pub const TRACING_TARGET: &str = "murmur_integration::inbound";
