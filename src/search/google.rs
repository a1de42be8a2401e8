//! Google Custom Search JSON API.
//!
//! General web search, so results are unvetted and pass through the
//! reputability allowlist. Requires both an API key and a search engine id.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use super::{get_json, RawHit, SearchBackend, SearchError};
use crate::config::SearchConfig;

const CUSTOM_SEARCH_URL: &str = "https://www.googleapis.com/customsearch/v1";
/// Custom Search rejects `num` above 10.
const MAX_PAGE_SIZE: usize = 10;
const DATE_META_KEYS: &[&str] = &[
    "citation_publication_date",
    "citation_date",
    "article:published_time",
    "dc.date",
];

pub struct GoogleSearchBackend {
    client: Client,
    base_url: String,
    api_key: String,
    engine_id: String,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct CustomSearchResponse {
    #[serde(default)]
    items: Vec<CustomSearchItem>,
}

#[derive(Debug, Deserialize)]
struct CustomSearchItem {
    title: Option<String>,
    link: Option<String>,
    snippet: Option<String>,
    pagemap: Option<PageMap>,
}

#[derive(Debug, Deserialize)]
struct PageMap {
    #[serde(default)]
    metatags: Vec<serde_json::Map<String, Value>>,
}

impl GoogleSearchBackend {
    pub fn new(client: Client, api_key: String, engine_id: String, max_results: usize) -> Self {
        Self {
            client,
            base_url: CUSTOM_SEARCH_URL.to_string(),
            api_key,
            engine_id,
            max_results,
        }
    }

    /// `None` unless both `GOOGLE_API_KEY` and `GOOGLE_CSE_ID` are set.
    pub fn from_config(config: &SearchConfig, client: Client) -> Option<Self> {
        let api_key = config.google_api_key.clone()?;
        let engine_id = config.google_cse_id.clone()?;
        Some(Self::new(client, api_key, engine_id, config.per_backend_limit))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// First publication date found in the page's meta tags.
fn metatag_date(pagemap: Option<&PageMap>) -> Option<String> {
    let tags = &pagemap?.metatags;
    DATE_META_KEYS.iter().find_map(|key| {
        tags.iter()
            .find_map(|tag| tag.get(*key).and_then(Value::as_str))
            .map(String::from)
    })
}

#[async_trait]
impl SearchBackend for GoogleSearchBackend {
    fn name(&self) -> &'static str {
        "Google"
    }

    fn vetted(&self) -> bool {
        false
    }

    async fn search(&self, term: &str) -> Result<Vec<RawHit>, SearchError> {
        info!(query = %term, "Searching Google Custom Search");

        let num = self.max_results.clamp(1, MAX_PAGE_SIZE).to_string();
        let request = self.client.get(&self.base_url).query(&[
            ("key", self.api_key.as_str()),
            ("cx", self.engine_id.as_str()),
            ("q", term),
            ("num", num.as_str()),
        ]);
        let response: CustomSearchResponse = get_json(request, self.name()).await?;

        Ok(response
            .items
            .into_iter()
            .filter_map(|item| {
                let year = metatag_date(item.pagemap.as_ref());
                Some(RawHit {
                    title: item.title,
                    url: item.link?,
                    snippet: item.snippet,
                    year,
                    ..RawHit::default()
                })
            })
            .take(self.max_results)
            .collect())
    }
}
