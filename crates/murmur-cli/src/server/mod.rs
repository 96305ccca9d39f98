//! HTTP server startup and graceful shutdown.

mod http_server;
mod lifecycle;
mod shutdown;

use std::io;

use axum::Router;
use http_server::serve_http;
use shutdown::shutdown_signal;

use crate::config::ServerConfig;

/// Starts the HTTP server and runs it until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails
/// while running.
pub async fn serve(app: Router, config: ServerConfig) -> io::Result<()> {
    serve_http(app, config).await
}
