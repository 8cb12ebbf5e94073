//! HTTP server for the Prometheus metrics endpoint.
//!
//! Runs on a separate tokio task and serves the configured path for
//! Prometheus scraping. Hosts that already run an HTTP server can mount
//! [`router`] themselves instead.

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::{Router, routing::get};
use prometheus::Registry;
use tokio_util::sync::CancellationToken;

use crate::error::MetricsError;

/// Content type of the Prometheus text exposition format.
pub const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

/// Handler for GET <path> - returns Prometheus metrics in text format.
async fn metrics_handler(State(registry): State<Registry>) -> impl IntoResponse {
    (
        [(CONTENT_TYPE, TEXT_FORMAT)],
        crate::metrics::gather_text(&registry),
    )
}

/// Router serving `registry` at `path`.
///
/// `path` must start with `/`.
pub fn router(registry: Registry, path: &str) -> Result<Router, MetricsError> {
    if !path.starts_with('/') {
        return Err(MetricsError::InvalidPath(path.to_string()));
    }
    Ok(Router::new()
        .route(path, get(metrics_handler))
        .with_state(registry))
}

/// Run the HTTP server for Prometheus metrics.
///
/// Binds to `addr` and serves `path` until `shutdown` is cancelled.
/// This is a long-running task that should be spawned in the background.
pub async fn run_http_server(
    addr: SocketAddr,
    path: String,
    registry: Registry,
    shutdown: CancellationToken,
) {
    let app = match router(registry, &path) {
        Ok(app) => app,
        Err(e) => {
            tracing::error!(error = %e, "Metrics HTTP server not started");
            return;
        }
    };

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind metrics HTTP server");
            return;
        }
    };
    tracing::info!(%addr, %path, "Prometheus HTTP server listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "Metrics HTTP server error");
    }
}
