#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod config;
mod server;

use std::process;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use murmur_integration::HubStores;
use murmur_server::handler::routes;
use murmur_server::middleware::{RouterObservabilityExt, RouterRecoveryExt, RouterSecurityExt};
use murmur_server::service::ServiceState;

use crate::config::{Cli, MiddlewareConfig};

// Tracing target constants
pub const TRACING_TARGET_SERVER_STARTUP: &str = "murmur_cli::server::startup";
pub const TRACING_TARGET_SERVER_SHUTDOWN: &str = "murmur_cli::server::shutdown";
pub const TRACING_TARGET_CONFIG: &str = "murmur_cli::config";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            "Application terminated successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = %error,
            "Application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    let cli = Cli::init();

    cli.init_tracing();
    cli.log();
    cli.validate()?;

    let store = cli.load_store().await?;
    let state = ServiceState::from_config(&cli.service, HubStores::in_memory(Arc::new(store)))
        .context("failed to create service state")?;
    let router = create_router(state, &cli.middleware);

    server::serve(router, cli.server).await?;

    Ok(())
}

/// Creates the router with all middleware layers applied.
///
/// Middleware is applied in reverse order (last added = outermost):
/// 1. Recovery (outermost): catches panics and enforces timeouts
/// 2. Observability: request ids and tracing spans
/// 3. Security: body limits and response headers
/// 4. Routes (innermost): request handlers and rate limiting
fn create_router(state: ServiceState, middleware: &MiddlewareConfig) -> Router {
    let api_routes: Router = routes(state.clone()).with_state(state);

    api_routes
        .with_security(&middleware.security)
        .with_observability()
        .with_recovery(&middleware.recovery)
}
