//! DuckDuckGo Instant Answer API.
//!
//! Not a full web search: hits come from the abstract, `Results` and the
//! (possibly nested) `RelatedTopics` of the instant answer. No key required.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::{get_json, RawHit, SearchBackend, SearchError};

const INSTANT_ANSWER_URL: &str = "https://api.duckduckgo.com/";

pub struct DuckDuckGoBackend {
    client: Client,
    base_url: String,
    max_results: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstantAnswer {
    #[serde(default)]
    heading: String,
    #[serde(default, rename = "AbstractText")]
    abstract_text: String,
    #[serde(default, rename = "AbstractURL")]
    abstract_url: String,
    #[serde(default)]
    results: Vec<Topic>,
    #[serde(default)]
    related_topics: Vec<Topic>,
}

/// Either a plain topic or a named group of nested topics.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Topic {
    #[serde(default, rename = "FirstURL")]
    first_url: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    topics: Vec<Topic>,
}

impl DuckDuckGoBackend {
    pub fn new(client: Client, max_results: usize) -> Self {
        Self {
            client,
            base_url: INSTANT_ANSWER_URL.to_string(),
            max_results,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

fn collect_topics(topics: Vec<Topic>, hits: &mut Vec<RawHit>) {
    for topic in topics {
        if !topic.topics.is_empty() {
            collect_topics(topic.topics, hits);
            continue;
        }
        if topic.first_url.is_empty() {
            continue;
        }
        // Topic text reads "Title - description"
        let title = topic
            .text
            .split_once(" - ")
            .map(|(title, _)| title.to_string())
            .unwrap_or_else(|| topic.text.clone());
        hits.push(RawHit {
            title: Some(title),
            url: topic.first_url,
            snippet: Some(topic.text),
            ..RawHit::default()
        });
    }
}

fn into_hits(answer: InstantAnswer) -> Vec<RawHit> {
    let mut hits = Vec::new();
    if !answer.abstract_url.is_empty() {
        hits.push(RawHit {
            title: Some(answer.heading),
            url: answer.abstract_url,
            snippet: Some(answer.abstract_text),
            ..RawHit::default()
        });
    }
    collect_topics(answer.results, &mut hits);
    collect_topics(answer.related_topics, &mut hits);
    hits
}

#[async_trait]
impl SearchBackend for DuckDuckGoBackend {
    fn name(&self) -> &'static str {
        "DuckDuckGo"
    }

    fn vetted(&self) -> bool {
        false
    }

    async fn search(&self, term: &str) -> Result<Vec<RawHit>, SearchError> {
        info!(query = %term, "Searching DuckDuckGo");

        let request = self.client.get(&self.base_url).query(&[
            ("q", term),
            ("format", "json"),
            ("no_html", "1"),
            ("skip_disambig", "1"),
        ]);
        let answer: InstantAnswer = get_json(request, self.name()).await?;

        let mut hits = into_hits(answer);
        hits.truncate(self.max_results);
        Ok(hits)
    }
}
