//! HTTP server exposing the segmentation service
//!
//! ```text
//! POST /api/segment  {"image": "<url>"}  -> output path of the result PNG
//! GET  /health                           -> model and backend in use
//! ```

pub mod dto;
pub mod error;
pub mod handlers;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;

use crate::error::{Result, SegmentError};
use std::net::SocketAddr;
use tracing::info;

/// Bind `address` and serve the router until ctrl-c
///
/// # Errors
/// - Address cannot be bound
/// - Server I/O failures
pub async fn serve(state: AppState, address: SocketAddr, max_request_bytes: usize) -> Result<()> {
    let app = create_router(state, max_request_bytes);
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|e| SegmentError::network_error(format!("Failed to bind {address}"), e))?;

    let local_addr = listener.local_addr()?;
    info!(address = %local_addr, "Segmentation API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
