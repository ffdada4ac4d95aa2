//! Liveness endpoint.
//!
//! The deployment platform requires a listening port; the endpoint must stay
//! responsive while a poll cycle is processing a batch.

use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::PipelineError;

async fn healthz() -> &'static str {
    "ok"
}

pub fn router() -> Router {
    Router::new().route("/healthz", get(healthz))
}

/// Serve the liveness endpoint until the shutdown token fires.
pub async fn serve(port: u16, shutdown: CancellationToken) -> crate::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| PipelineError::config(format!("cannot bind health port {port}: {e}")))?;
    serve_on(listener, shutdown).await
}

pub async fn serve_on(listener: TcpListener, shutdown: CancellationToken) -> crate::Result<()> {
    let addr = listener
        .local_addr()
        .map_err(|e| PipelineError::internal(format!("health listener address: {e}")))?;
    info!(%addr, "health server listening");

    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| PipelineError::internal(format!("health server failed: {e}")))
}
