//! CLI configuration management.
//!
//! This module defines the complete CLI configuration hierarchy:
//!
//! ```text
//! Cli
//! ├── server: ServerConfig          # Host, port, shutdown
//! ├── middleware: MiddlewareConfig  # Body limits, timeouts
//! ├── service: ServiceConfig        # URLs, keys, provider client, rate limits
//! ├── seed: Option<PathBuf>         # In-memory store seed
//! └── log_json: bool                # Log format
//! ```
//!
//! All configuration can be provided via CLI arguments or environment variables.
//! Use `--help` to see all available options.
//!
//! # Example
//!
//! ```bash
//! murmur --public-url https://hub.example.com --port 8080
//!
//! # Or via environment variables
//! PUBLIC_URL=https://hub.example.com PORT=8080 murmur
//! ```

mod middleware;
mod server;

use std::path::PathBuf;
use std::process;

use anyhow::Context;
use clap::Parser;
pub use middleware::MiddlewareConfig;
use murmur_integration::store::{MemoryStore, Seed};
use murmur_server::service::ServiceConfig;
use serde::{Deserialize, Serialize};
pub use server::ServerConfig;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{TRACING_TARGET_CONFIG, TRACING_TARGET_SERVER_STARTUP};

/// Complete CLI configuration.
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(name = "murmur")]
#[command(about = "Integration hub: webhooks, OAuth connections and user sync")]
#[command(version)]
pub struct Cli {
    /// Server network and lifecycle configuration.
    #[clap(flatten)]
    pub server: ServerConfig,

    /// HTTP middleware configuration (body limits, timeouts).
    #[clap(flatten)]
    pub middleware: MiddlewareConfig,

    /// Hub configuration (URLs, keys, provider client, rate limits).
    #[clap(flatten)]
    pub service: ServiceConfig,

    /// JSON file seeding the in-memory store
    #[arg(long, env = "SEED_FILE")]
    pub seed: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value_t = false)]
    #[serde(default)]
    pub log_json: bool,
}

impl Cli {
    /// Loads environment variables from .env file (if enabled) and parses CLI arguments.
    ///
    /// The .env file is loaded before clap parses arguments, so its values act
    /// as environment defaults.
    pub fn init() -> Self {
        Self::load_dotenv();
        Self::parse()
    }

    /// Loads environment variables from .env file if the dotenv feature is enabled.
    #[cfg(feature = "dotenv")]
    fn load_dotenv() {
        if let Err(err) = dotenvy::dotenv()
            && !err.not_found()
        {
            eprintln!("Warning: failed to load .env file: {err}");
        }
    }

    /// No-op when dotenv feature is disabled.
    #[cfg(not(feature = "dotenv"))]
    fn load_dotenv() {}

    /// Initializes tracing with environment-based filtering.
    pub fn init_tracing(&self) {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let registry = tracing_subscriber::registry().with(filter);

        if self.log_json {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        } else {
            registry.with(tracing_subscriber::fmt::layer()).init();
        }
    }

    /// Validates all configuration values.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.server
            .validate()
            .context("invalid server configuration")?;
        self.service
            .validate()
            .context("invalid service configuration")?;
        Ok(())
    }

    /// Builds the in-memory store, seeded when a seed file is given.
    pub async fn load_store(&self) -> anyhow::Result<MemoryStore> {
        let Some(path) = &self.seed else {
            tracing::info!(target: TRACING_TARGET_CONFIG, "Starting with an empty store");
            return Ok(MemoryStore::new());
        };

        let seed = read_seed(path).await?;
        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            path = %path.display(),
            platform_credentials = seed.platform_credentials.len(),
            users = seed.users.len(),
            "Seeding store"
        );

        Ok(MemoryStore::from_seed(seed).await)
    }

    /// Logs configuration without sensitive values.
    pub fn log(&self) {
        tracing::debug!(
            target: TRACING_TARGET_SERVER_STARTUP,
            version = env!("CARGO_PKG_VERSION"),
            pid = process::id(),
            arch = std::env::consts::ARCH,
            os = std::env::consts::OS,
            features = ?Self::enabled_features(),
            "Build information"
        );

        self.server.log();
        self.middleware.log();

        tracing::info!(
            target: TRACING_TARGET_CONFIG,
            public_url = %self.service.public_url,
            settings_url = %self.service.settings_url,
            encryption_key_configured = self.service.encryption_key.is_some(),
            state_secret_configured = self.service.state_secret.is_some(),
            state_ttl_secs = self.service.state_ttl_secs,
            rate_limit_capacity = self.service.rate_limit.capacity,
            rate_limit_refill = self.service.rate_limit.refill_rate,
            "Service configuration"
        );
    }

    /// Returns a list of enabled compile-time features.
    fn enabled_features() -> Vec<&'static str> {
        [cfg!(feature = "dotenv").then_some("dotenv")]
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Reads and parses a seed file.
async fn read_seed(path: &std::path::Path) -> anyhow::Result<Seed> {
    let contents = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read seed file {}", path.display()))?;

    serde_json::from_slice(&contents)
        .with_context(|| format!("seed file {} is not valid JSON", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_defaults() {
        let cli = Cli::try_parse_from(["murmur"]).unwrap();
        assert!(cli.validate().is_ok());
        assert!(cli.seed.is_none());
        assert_eq!(cli.server.port, 8080);
    }

    #[test]
    fn rejects_invalid_service_values() {
        let cli = Cli::try_parse_from(["murmur", "--state-ttl-secs", "5"]).unwrap();
        assert!(cli.validate().is_err());
    }

    #[tokio::test]
    async fn reads_seed_file() {
        let path = std::env::temp_dir().join(format!("murmur-seed-{}.json", process::id()));
        tokio::fs::write(
            &path,
            r#"{"platformCredentials":{"slack":{"clientId":"id","clientSecret":"secret"}}}"#,
        )
        .await
        .unwrap();

        let seed = read_seed(&path).await.unwrap();
        assert_eq!(seed.platform_credentials.len(), 1);

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
