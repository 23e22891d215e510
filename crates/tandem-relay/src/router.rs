//! Axum router construction for the relay.
//!
//! Assembles the routes into a single [`Router`] with CORS middleware
//! enabled for browser clients.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::RelayState;
use crate::ws;

/// Build the complete Axum router for the relay.
///
/// The router includes:
/// - `GET /health` -- liveness and room count
/// - `GET /ws/{room}` -- `WebSocket` real-time channel of one pair
pub fn build_router(state: Arc<RelayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/ws/{room}", get(ws::ws_room))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
