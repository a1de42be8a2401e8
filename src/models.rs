use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tracing::info;

use crate::config::Config;
use crate::email::{BrevoMailer, EmailError, Mailer};
use crate::search::Aggregator;
use crate::storage::ArticleStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub aggregator: Arc<Aggregator>,
    pub store: Arc<ArticleStore>,
    pub mailer: Option<Arc<dyn Mailer>>,
}

impl AppState {
    /// Wire the aggregator, store and (if configured) mailer from configuration.
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let aggregator = Aggregator::from_config(&config.search)?;
        let store = ArticleStore::from_config(&config);

        let mailer: Option<Arc<dyn Mailer>> =
            match BrevoMailer::from_config(&config.email, config.search.http_timeout) {
                Ok(mailer) => Some(Arc::new(mailer)),
                Err(EmailError::NotConfigured) => {
                    info!("BREVO_API_KEY not set, digest emails disabled");
                    None
                }
                Err(e) => return Err(e.into()),
            };

        Ok(Self {
            config: Arc::new(config),
            aggregator: Arc::new(aggregator),
            store: Arc::new(store),
            mailer,
        })
    }
}

/// Citation count as reported by a backend.
///
/// Most backends do not report citations at all, which is distinct from a
/// paper that is known to have zero citations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<u32>", into = "Option<u32>")]
pub enum Citations {
    #[default]
    Unknown,
    Known(u32),
}

impl Citations {
    /// Rank key: known nonzero counts first (highest first), then unknown,
    /// then known zero.
    fn rank_key(self) -> (u8, u32) {
        match self {
            Citations::Known(n) if n > 0 => (2, n),
            Citations::Unknown => (1, 0),
            Citations::Known(_) => (0, 0),
        }
    }
}

impl PartialOrd for Citations {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Citations {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_key().cmp(&other.rank_key())
    }
}

impl From<Option<u32>> for Citations {
    fn from(value: Option<u32>) -> Self {
        value.map(Citations::Known).unwrap_or(Citations::Unknown)
    }
}

impl From<Citations> for Option<u32> {
    fn from(value: Citations) -> Self {
        match value {
            Citations::Known(n) => Some(n),
            Citations::Unknown => None,
        }
    }
}

/// A normalized search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    pub source_domain: String,
    /// Backend that produced the record.
    #[serde(default)]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    #[serde(default)]
    pub snippet: String,
    #[serde(default)]
    pub publication_year: Option<i32>,
    #[serde(default)]
    pub citation_count: Citations,
    #[serde(default)]
    pub language_match: bool,
    #[serde(default)]
    pub has_full_text: bool,
    pub discovered_at: DateTime<Utc>,
}

/// `last-search.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSearchData {
    pub last_search_timestamp: Option<DateTime<Utc>>,
    pub next_scheduled_search: Option<DateTime<Utc>>,
    #[serde(default)]
    pub articles_found: usize,
    #[serde(default)]
    pub sources_searched: Vec<String>,
}

/// `articles.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArticlesData {
    #[serde(default)]
    pub articles: Vec<SearchRecord>,
    pub last_updated: Option<DateTime<Utc>>,
}

// API Request/Response types

/// JSON envelope returned by every trigger endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchSummary {
    pub articles_found: usize,
    pub language_matches: usize,
    pub full_text_articles: usize,
    pub weekly_articles: Vec<SearchRecord>,
    pub message: String,
    pub date_range: String,
    pub search_terms: Vec<String>,
    pub sources_searched: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailSummary {
    pub articles_count: usize,
    pub email_sent: bool,
    pub recipient: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub last_search: LastSearchData,
    pub articles_count: usize,
    pub email_recipient: String,
    pub needs_search: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
}
