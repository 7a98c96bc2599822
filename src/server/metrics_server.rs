// src/server/metrics_server.rs

use crate::core::metrics::{self, gather_metrics};
use crate::core::state::ServerState;
use axum::{Router, http::StatusCode, response::IntoResponse, routing::get};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Handles HTTP requests to the /metrics endpoint.
///
/// It refreshes the client gauge from the live-connection set before
/// gathering all registered metrics in the Prometheus text format.
async fn metrics_handler(state: Arc<ServerState>) -> impl IntoResponse {
    metrics::CONNECTED_CLIENTS.set(state.client_count() as f64);

    let body = gather_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}

/// Runs a simple HTTP server to expose Prometheus metrics on /metrics.
///
/// A failure to bind is logged and the exporter stays off; it never takes the
/// command server down with it.
pub async fn run_metrics_server(
    state: Arc<ServerState>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let port = state.config.metrics.port;
    let app = Router::new().route("/metrics", get(move || metrics_handler(state.clone())));

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server on port {}: {}", port, e);
            return Ok(());
        }
    };
    info!(
        "Prometheus metrics server listening on http://{}/metrics",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_rx.recv().await.ok();
            info!("Metrics server shutting down.");
        })
        .await?;
    Ok(())
}
