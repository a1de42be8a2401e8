use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;

use crate::models::{ApiEnvelope, AppState, SearchRecord};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/articles", get(weekly_articles))
        .with_state(state)
}

/// GET /api/articles - Stored articles from the last seven days
async fn weekly_articles(State(state): State<AppState>) -> Json<ApiEnvelope<Vec<SearchRecord>>> {
    Json(ApiEnvelope::ok(state.store.weekly_articles(Utc::now()).await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::*;
    use crate::routes::test_helpers::call;
    use axum::http::StatusCode;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_articles_empty_store() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, Vec::new(), None);

        let (status, body) = call(router(state), "GET", "/api/articles").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_articles_after_search() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, vec![Box::new(StaticBackend(hits(&["https://who.int/a"])))], None);
        crate::pipeline::run_search(&state).await.unwrap();

        let (_, body) = call(router(state), "GET", "/api/articles").await;
        assert_eq!(body["data"][0]["url"], "https://who.int/a");
        assert_eq!(body["data"][0]["source"], "Mock");
    }
}
