//! Search and digest runs shared by the HTTP routes, the CLI and the scheduler.

use chrono::Utc;
use tracing::{error, info, warn};

use crate::email::{render_digest, EmailError};
use crate::models::{AppState, EmailSummary, SearchRecord, SearchSummary, StatusResponse};
use crate::search::year_range;
use crate::types::{AppError, AppResult};

pub const SEARCH_FAILED_MESSAGE: &str = "Erro ao realizar pesquisa. Tente novamente.";
pub const NO_RESULTS_MESSAGE: &str =
    "Nenhum artigo encontrado nas fontes pesquisadas. Tente novamente mais tarde.";

fn completed_message(records: &[SearchRecord]) -> String {
    let language = records.iter().filter(|r| r.language_match).count();
    let full_text = records.iter().filter(|r| r.has_full_text).count();
    format!(
        "Pesquisa concluída! {} artigos encontrados ({} em português, {} com texto completo).",
        records.len(),
        language,
        full_text
    )
}

/// Run the aggregator over every configured term and persist the results.
///
/// Executes on a spawned task so a panic anywhere in the run surfaces as an
/// [`AppError::Internal`] rather than tearing down the caller.
pub async fn run_search(state: &AppState) -> AppResult<SearchSummary> {
    let state = state.clone();
    tokio::spawn(async move { search_and_store(&state).await })
        .await
        .map_err(|e| {
            error!(error = %e, "Search task aborted");
            AppError::Internal(format!("search task aborted: {}", e))
        })?
}

async fn search_and_store(state: &AppState) -> AppResult<SearchSummary> {
    let terms = state.config.search.all_terms();
    let sources = state.aggregator.backend_names();
    info!(terms = terms.len(), sources = ?sources, "Starting literature search");

    let records = state.aggregator.search_all(&terms).await;
    state.store.save_results(&records, &sources).await?;

    let (min_year, max_year) = year_range(state.config.search.year_window);
    let message = if records.is_empty() {
        NO_RESULTS_MESSAGE.to_string()
    } else {
        completed_message(&records)
    };

    Ok(SearchSummary {
        articles_found: records.len(),
        language_matches: records.iter().filter(|r| r.language_match).count(),
        full_text_articles: records.iter().filter(|r| r.has_full_text).count(),
        weekly_articles: records,
        message,
        date_range: format!("{}-{}", min_year, max_year),
        search_terms: terms,
        sources_searched: sources,
    })
}

/// Run a search and email the digest of its results.
///
/// Fails fast with [`EmailError::NotConfigured`] when no mailer exists. A run
/// that finds nothing succeeds without sending.
pub async fn run_digest(state: &AppState) -> AppResult<EmailSummary> {
    let Some(mailer) = state.mailer.clone() else {
        warn!("Digest requested but email is not configured");
        return Err(EmailError::NotConfigured.into());
    };

    let summary = run_search(state).await?;
    let records = summary.weekly_articles;
    let now = Utc::now();

    if records.is_empty() {
        info!("No articles found, digest not sent");
        return Ok(EmailSummary {
            articles_count: 0,
            email_sent: false,
            recipient: mailer.recipient().to_string(),
            message_id: None,
            message: "Nenhum artigo encontrado. Email não enviado.".to_string(),
            timestamp: now,
        });
    }

    let digest = render_digest(&records, now);
    let delivery = mailer.send(&digest).await?;

    Ok(EmailSummary {
        articles_count: records.len(),
        email_sent: true,
        recipient: delivery.recipient,
        message_id: delivery.message_id,
        message: "Email enviado com sucesso.".to_string(),
        timestamp: now,
    })
}

pub async fn status(state: &AppState) -> StatusResponse {
    let now = Utc::now();
    StatusResponse {
        last_search: state.store.read_last_search().await,
        articles_count: state.store.read_articles().await.articles.len(),
        email_recipient: state.config.email.recipient_email.clone(),
        needs_search: state.store.needs_search(now).await,
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn test_run_search_persists_and_summarizes() {
        let dir = TempDir::new().unwrap();
        let state = state(
            &dir,
            vec![Box::new(StaticBackend(hits(&[
                "https://who.int/a",
                "https://who.int/b",
            ])))],
            None,
        );

        let summary = run_search(&state).await.unwrap();
        assert_eq!(summary.articles_found, 2);
        assert_eq!(summary.language_matches, 2);
        assert_eq!(summary.full_text_articles, 2);
        assert_eq!(summary.search_terms, vec!["anemia", "sangue"]);
        assert_eq!(summary.sources_searched, vec!["Mock"]);
        assert_eq!(
            summary.message,
            "Pesquisa concluída! 2 artigos encontrados (2 em português, 2 com texto completo)."
        );

        let status = status(&state).await;
        assert_eq!(status.articles_count, 2);
        assert_eq!(status.last_search.articles_found, 2);
        assert_eq!(status.email_recipient, "reader@example.org");
        assert!(!status.needs_search);
    }

    #[tokio::test]
    async fn test_run_search_without_results() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, vec![Box::new(StaticBackend(Vec::new()))], None);

        let summary = run_search(&state).await.unwrap();
        assert_eq!(summary.articles_found, 0);
        assert_eq!(summary.message, NO_RESULTS_MESSAGE);
    }

    #[tokio::test]
    async fn test_panicking_backend_keeps_other_results() {
        let dir = TempDir::new().unwrap();
        let state = state(
            &dir,
            vec![
                Box::new(PanickingBackend),
                Box::new(StaticBackend(hits(&["https://who.int/a"]))),
            ],
            None,
        );

        let summary = run_search(&state).await.unwrap();
        assert_eq!(summary.articles_found, 1);
        assert_eq!(summary.sources_searched, vec!["Panicking", "Mock"]);
        assert_eq!(state.store.read_articles().await.articles.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_fails_the_run() {
        let dir = TempDir::new().unwrap();
        let mut state = state(&dir, vec![Box::new(StaticBackend(hits(&["https://who.int/a"])))], None);
        state.store = Arc::new(unwritable_store(&dir));
        assert!(matches!(run_search(&state).await, Err(AppError::Storage(_))));
    }

    #[tokio::test]
    async fn test_digest_requires_mailer() {
        let dir = TempDir::new().unwrap();
        let state = state(&dir, vec![Box::new(StaticBackend(hits(&["https://who.int/a"])))], None);
        assert!(matches!(
            run_digest(&state).await,
            Err(AppError::Email(EmailError::NotConfigured))
        ));
    }

    #[tokio::test]
    async fn test_digest_sends_rendered_results() {
        let dir = TempDir::new().unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let state = state(
            &dir,
            vec![Box::new(StaticBackend(hits(&["https://who.int/a"])))],
            Some(mailer.clone()),
        );

        let summary = run_digest(&state).await.unwrap();
        assert!(summary.email_sent);
        assert_eq!(summary.articles_count, 1);
        assert_eq!(summary.message_id.as_deref(), Some("msg-1"));

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].subject.contains("1 Artigos"));
    }

    #[tokio::test]
    async fn test_digest_with_no_results_sends_nothing() {
        let dir = TempDir::new().unwrap();
        let mailer = Arc::new(RecordingMailer::default());
        let state = state(&dir, vec![Box::new(StaticBackend(Vec::new()))], Some(mailer.clone()));

        let summary = run_digest(&state).await.unwrap();
        assert!(!summary.email_sent);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }
}
