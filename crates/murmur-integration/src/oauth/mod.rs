//! OAuth connection flow and the signed state that protects it.

mod manager;
mod state;

pub use manager::OAuthManager;
pub use state::{DEFAULT_MAX_CONSUMED, DEFAULT_STATE_TTL, OAuthState, StateSigner};

/// Tracing target for OAuth operations.
pub const TRACING_TARGET: &str = "murmur_integration::oauth";
