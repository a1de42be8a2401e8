//! API Routes
//!
//! - `/api/search` - Run the literature search and persist the results
//! - `/api/cron/email` - Run a search and email the weekly digest
//! - `/api/articles` - Articles discovered in the last seven days
//! - `/api/status` - Last search, stored article count, schedule state
//! - `/api/health` - Liveness

pub mod articles;
pub mod email;
pub mod health;
pub mod search;
pub mod status;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::cors_layer;
use crate::models::AppState;

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    info!("Creating application router");

    let cors = cors_layer(&state.config.server.cors_allowed_origins);

    Router::new()
        .merge(search::router(state.clone()))
        .merge(email::router(state.clone()))
        .merge(articles::router(state.clone()))
        .merge(status::router(state))
        .merge(health::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
