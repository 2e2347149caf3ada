//! Route table and middleware

use crate::server::{handlers, state::AppState};
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Build the API router
#[must_use]
pub fn create_router(state: AppState, max_request_bytes: usize) -> Router {
    Router::new()
        .route("/api/segment", post(handlers::segment))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(max_request_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
