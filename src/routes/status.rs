use axum::{extract::State, routing::get, Json, Router};

use crate::models::{ApiEnvelope, AppState, StatusResponse};
use crate::pipeline;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(system_status))
        .with_state(state)
}

/// GET /api/status - Last search and schedule state
async fn system_status(State(state): State<AppState>) -> Json<ApiEnvelope<StatusResponse>> {
    Json(ApiEnvelope::ok(pipeline::status(&state).await))
}
