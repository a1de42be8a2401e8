use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::{error, info};

use crate::models::{ApiEnvelope, AppState, SearchSummary};
use crate::pipeline::{self, SEARCH_FAILED_MESSAGE};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/search", get(run_search).post(run_search))
        .with_state(state)
}

/// GET|POST /api/search - Run the search pipeline
async fn run_search(State(state): State<AppState>) -> impl IntoResponse {
    info!("Search requested");

    match pipeline::run_search(&state).await {
        Ok(summary) => (StatusCode::OK, Json(ApiEnvelope::ok(summary))).into_response(),
        Err(e) => {
            error!(error = %e, "Search failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiEnvelope::<SearchSummary>::failure(SEARCH_FAILED_MESSAGE)),
            )
                .into_response()
        }
    }
}
