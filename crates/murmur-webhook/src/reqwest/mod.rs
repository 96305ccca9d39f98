//! Reqwest-based HTTP client for provider REST APIs.
//!
//! # Example
//!
//! ```rust,ignore
//! use murmur_webhook::reqwest::{ProviderClient, ReqwestConfig};
//!
//! let client = ProviderClient::new(ReqwestConfig::default())?;
//! let response = client
//!     .send(client.http().get("https://api.github.com/user").bearer_auth(token))
//!     .await?;
//! ```

mod client;
mod config;
mod error;

pub use client::{ProviderClient, ProviderResponse};
pub use config::ReqwestConfig;
pub use error::{Error, Result};

/// Tracing target for provider client operations.
pub const TRACING_TARGET: &str = "murmur_webhook::reqwest";
