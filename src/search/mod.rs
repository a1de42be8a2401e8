//! Search Module
//!
//! Aggregates medical literature from several public search APIs:
//! - PubMed E-utilities (esearch → esummary → efetch)
//! - Europe PMC REST search
//! - Semantic Scholar Graph API (citation counts, open-access PDFs)
//! - Google Custom Search and DuckDuckGo (unvetted web search)
//! - A curated static table used as fallback content
//!
//! Every backend implements [`SearchBackend`]. Backend failures never escape
//! [`SearchBackend::fetch`]; they are logged and reduced to an empty list so
//! one broken API cannot abort an aggregation run.

pub mod aggregator;
pub mod curated;
pub mod duckduckgo;
pub mod europe_pmc;
pub mod google;
pub mod normalize;
pub mod pubmed;
pub mod reputability;
pub mod semantic_scholar;

pub use aggregator::Aggregator;
pub use normalize::Normalizer;
pub use reputability::{ReputabilityPolicy, ReputabilityScope};

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use chrono::{Datelike, Utc};
use futures::FutureExt;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::SearchConfig;
use crate::models::Citations;

pub const USER_AGENT: &str = concat!("medlit-digest/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur inside a single backend call
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{backend} responded with HTTP {status}")]
    Status { backend: &'static str, status: u16 },

    #[error("Failed to parse search results: {0}")]
    Parse(String),
}

/// A hit as returned by a backend, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawHit {
    pub title: Option<String>,
    pub url: String,
    pub snippet: Option<String>,
    pub authors: Option<String>,
    /// Free-form date text; the first 4-digit run is taken as the year.
    pub year: Option<String>,
    pub citations: Citations,
    pub has_full_text: bool,
}

#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Display name, recorded as the record's `source`.
    fn name(&self) -> &'static str;

    /// Curated scholarly indexes are vetted; general web search is not.
    fn vetted(&self) -> bool {
        true
    }

    async fn search(&self, term: &str) -> Result<Vec<RawHit>, SearchError>;

    /// Fail-soft wrapper around [`SearchBackend::search`]. Errors and panics
    /// both reduce to an empty list.
    async fn fetch(&self, term: &str) -> Vec<RawHit> {
        match AssertUnwindSafe(self.search(term)).catch_unwind().await {
            Ok(Ok(hits)) => {
                debug!(backend = self.name(), term = %term, count = hits.len(), "Backend search completed");
                hits
            }
            Ok(Err(e)) => {
                warn!(backend = self.name(), term = %term, error = %e, "Backend search failed, skipping");
                Vec::new()
            }
            Err(panic) => {
                warn!(
                    backend = self.name(),
                    term = %term,
                    panic = panic_message(panic.as_ref()),
                    "Backend search panicked, skipping"
                );
                Vec::new()
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Shared HTTP client with the per-call timeout applied.
pub fn http_client(config: &SearchConfig) -> Result<Client, SearchError> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(config.http_timeout)
        .build()?)
}

/// Inclusive publication-year range `[current - window, current]`.
pub fn year_range(window: i32) -> (i32, i32) {
    let current = Utc::now().year();
    (current - window, current)
}

/// Instantiate the configured backends in configured order.
///
/// Backends missing required credentials are skipped.
pub fn build_backends(config: &SearchConfig, client: &Client) -> Vec<Box<dyn SearchBackend>> {
    let limit = config.per_backend_limit;
    let mut backends: Vec<Box<dyn SearchBackend>> = Vec::new();

    for name in &config.backends {
        match name.as_str() {
            "europepmc" => backends.push(Box::new(europe_pmc::EuropePmcBackend::new(
                client.clone(),
                limit,
                config.year_window,
            ))),
            "semanticscholar" => backends.push(Box::new(
                semantic_scholar::SemanticScholarBackend::new(client.clone(), limit, config.year_window)
                    .with_api_key(config.semantic_scholar_api_key.clone()),
            )),
            "pubmed" => backends.push(Box::new(
                pubmed::PubMedBackend::new(client.clone(), limit, config.year_window)
                    .with_courtesy_delay(config.courtesy_delay)
                    .with_credentials(config.ncbi_api_key.clone(), config.ncbi_email.clone()),
            )),
            "google" => match google::GoogleSearchBackend::from_config(config, client.clone()) {
                Some(backend) => backends.push(Box::new(backend)),
                None => info!("Google Custom Search not configured (GOOGLE_API_KEY / GOOGLE_CSE_ID), skipping"),
            },
            "duckduckgo" => backends.push(Box::new(duckduckgo::DuckDuckGoBackend::new(
                client.clone(),
                limit,
            ))),
            "static" => backends.push(Box::new(curated::CuratedBackend::new(limit))),
            other => warn!(backend = %other, "Unknown search backend, skipping"),
        }
    }

    backends
}

/// Send a request and decode its JSON body.
pub(crate) async fn get_json<T: DeserializeOwned>(
    request: RequestBuilder,
    backend: &'static str,
) -> Result<T, SearchError> {
    let body = get_text(request, backend).await?;
    serde_json::from_str(&body).map_err(|e| SearchError::Parse(format!("{backend}: {e}")))
}

/// Send a request and return its body, rejecting non-2xx responses.
pub(crate) async fn get_text(
    request: RequestBuilder,
    backend: &'static str,
) -> Result<String, SearchError> {
    let response = request.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(SearchError::Status {
            backend,
            status: status.as_u16(),
        });
    }
    let body = response.text().await?;
    debug!(backend, bytes = body.len(), "Raw response received");
    Ok(body)
}
