// medlit-digest - weekly medical literature digest for bloodless medicine

pub mod config;
pub mod email;
pub mod middleware;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod scheduler;
pub mod search;    // Literature search backends and aggregation
pub mod storage;   // JSON file persistence
pub mod types;

// Re-exports for convenience
pub use config::Config;
pub use models::AppState;

pub fn create_router(state: AppState) -> axum::Router {
    routes::create_router(state)
}
