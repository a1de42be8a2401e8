//! Semantic Scholar Graph API search.
//!
//! The only backend that reports citation counts. Open-access PDF links are
//! preferred over the landing page when present.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::{get_json, year_range, RawHit, SearchBackend, SearchError};
use crate::models::Citations;

const SEMANTIC_SCHOLAR_URL: &str = "https://api.semanticscholar.org/graph/v1/paper/search";
const FIELDS: &str = "title,authors,year,abstract,url,citationCount,openAccessPdf,publicationDate";
const MISSING_ABSTRACT: &str = "Resumo não disponível.";

pub struct SemanticScholarBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    max_results: usize,
    year_window: i32,
}

#[derive(Debug, Deserialize)]
struct PaperSearchResponse {
    #[serde(default)]
    data: Vec<Paper>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Paper {
    paper_id: Option<String>,
    title: Option<String>,
    #[serde(default)]
    authors: Vec<Author>,
    year: Option<i32>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    url: Option<String>,
    citation_count: Option<u32>,
    open_access_pdf: Option<OpenAccessPdf>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAccessPdf {
    url: Option<String>,
}

impl SemanticScholarBackend {
    pub fn new(client: Client, max_results: usize, year_window: i32) -> Self {
        Self {
            client,
            base_url: SEMANTIC_SCHOLAR_URL.to_string(),
            api_key: None,
            max_results,
            year_window,
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn into_hit(paper: Paper) -> Option<RawHit> {
        let pdf_url = paper
            .open_access_pdf
            .and_then(|pdf| pdf.url)
            .filter(|u| !u.trim().is_empty());
        let has_full_text = pdf_url.is_some();

        let url = pdf_url
            .or_else(|| paper.url.filter(|u| !u.trim().is_empty()))
            .or_else(|| {
                paper
                    .paper_id
                    .as_ref()
                    .map(|id| format!("https://www.semanticscholar.org/paper/{}", id))
            })?;

        let authors = paper
            .authors
            .into_iter()
            .filter_map(|a| a.name)
            .collect::<Vec<_>>()
            .join(", ");

        Some(RawHit {
            title: paper.title,
            url,
            snippet: Some(
                paper
                    .abstract_text
                    .filter(|a| !a.trim().is_empty())
                    .unwrap_or_else(|| MISSING_ABSTRACT.to_string()),
            ),
            authors: Some(authors).filter(|a| !a.is_empty()),
            year: paper.year.map(|y| y.to_string()),
            citations: Citations::from(paper.citation_count),
            has_full_text,
        })
    }
}

#[async_trait]
impl SearchBackend for SemanticScholarBackend {
    fn name(&self) -> &'static str {
        "Semantic Scholar"
    }

    async fn search(&self, term: &str) -> Result<Vec<RawHit>, SearchError> {
        let (min_year, max_year) = year_range(self.year_window);
        info!(query = %term, "Searching Semantic Scholar");

        let limit = self.max_results.to_string();
        let years = format!("{}-{}", min_year, max_year);
        let mut request = self.client.get(&self.base_url).query(&[
            ("query", term),
            ("limit", limit.as_str()),
            ("fields", FIELDS),
            ("year", years.as_str()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response: PaperSearchResponse = get_json(request, self.name()).await?;
        Ok(response
            .data
            .into_iter()
            .filter_map(Self::into_hit)
            .take(self.max_results)
            .collect())
    }
}
