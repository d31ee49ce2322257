//! Health check endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    /// Task queue the saga engine serves.
    pub task_queue: String,
}

/// GET /health: liveness plus the saga worker's task queue.
pub async fn check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        task_queue: state.engine.task_queue().to_string(),
    })
}
