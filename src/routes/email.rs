use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tracing::{error, info, warn};

use crate::email::EmailError;
use crate::models::{ApiEnvelope, AppState, EmailSummary};
use crate::pipeline;
use crate::types::AppError;

const EMAIL_NOT_CONFIGURED: &str = "Email não configurado (BREVO_API_KEY em falta).";
const EMAIL_FAILED: &str = "Erro ao enviar email. Tente novamente.";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/cron/email", get(send_digest).post(send_digest))
        .with_state(state)
}

/// GET|POST /api/cron/email - Search and email the digest
async fn send_digest(State(state): State<AppState>) -> impl IntoResponse {
    info!("Digest email requested");

    match pipeline::run_digest(&state).await {
        Ok(summary) => (StatusCode::OK, Json(ApiEnvelope::ok(summary))).into_response(),
        Err(AppError::Email(EmailError::NotConfigured)) => {
            warn!("Digest email requested without BREVO_API_KEY");
            (
                StatusCode::OK,
                Json(ApiEnvelope::<EmailSummary>::failure(EMAIL_NOT_CONFIGURED)),
            )
                .into_response()
        }
        Err(e) => {
            error!(error = %e, "Digest email failed");
            let message = match e {
                AppError::Email(_) => EMAIL_FAILED,
                _ => pipeline::SEARCH_FAILED_MESSAGE,
            };
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ApiEnvelope::<EmailSummary>::failure(message)),
            )
                .into_response()
        }
    }
}
