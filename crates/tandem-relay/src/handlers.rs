//! HTTP handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::state::RelayState;

/// `GET /health` -- liveness plus the number of open rooms.
pub async fn health(State(state): State<Arc<RelayState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "rooms": state.room_count(),
    }))
}
