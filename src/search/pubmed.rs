//! PubMed E-utilities search.
//!
//! Three sequential calls per term:
//! 1. `esearch` - PMIDs matching the term within the year window
//! 2. `esummary` - titles, authors, publication dates
//! 3. `efetch` - XML records, used only to extract abstracts
//!
//! A courtesy delay separates the calls. A failed `efetch` keeps the
//! summaries and falls back to a placeholder abstract.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::normalize::{collapse_whitespace, truncate_chars};
use super::{get_json, get_text, year_range, RawHit, SearchBackend, SearchError};

const EUTILS_BASE: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";
const TOOL_NAME: &str = "medlit-digest";
pub const ABSTRACT_CHAR_LIMIT: usize = 500;
const MISSING_ABSTRACT: &str = "Resumo disponível no link.";

pub struct PubMedBackend {
    client: Client,
    base_url: String,
    max_results: usize,
    year_window: i32,
    courtesy_delay: Duration,
    api_key: Option<String>,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    #[serde(default)]
    esearchresult: ESearchResult,
}

#[derive(Debug, Default, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    idlist: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ESummaryResponse {
    #[serde(default)]
    result: serde_json::Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct DocumentSummary {
    #[serde(default)]
    title: String,
    #[serde(default)]
    pubdate: String,
    #[serde(default)]
    authors: Vec<SummaryAuthor>,
    #[serde(default)]
    articleids: Vec<ArticleId>,
}

#[derive(Debug, Deserialize)]
struct SummaryAuthor {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct ArticleId {
    #[serde(default)]
    idtype: String,
    #[serde(default)]
    value: String,
}

impl PubMedBackend {
    pub fn new(client: Client, max_results: usize, year_window: i32) -> Self {
        Self {
            client,
            base_url: EUTILS_BASE.to_string(),
            max_results,
            year_window,
            courtesy_delay: Duration::from_millis(350),
            api_key: None,
            email: None,
        }
    }

    pub fn with_courtesy_delay(mut self, delay: Duration) -> Self {
        self.courtesy_delay = delay;
        self
    }

    /// NCBI API key and contact email, both optional.
    pub fn with_credentials(mut self, api_key: Option<String>, email: Option<String>) -> Self {
        self.api_key = api_key;
        self.email = email;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn request(&self, endpoint: &str, params: &[(&str, &str)]) -> RequestBuilder {
        let mut request = self
            .client
            .get(format!("{}/{}", self.base_url, endpoint))
            .query(params)
            .query(&[("tool", TOOL_NAME)]);
        if let Some(email) = &self.email {
            request = request.query(&[("email", email.as_str())]);
        }
        if let Some(key) = &self.api_key {
            request = request.query(&[("api_key", key.as_str())]);
        }
        request
    }

    async fn pause(&self) {
        if !self.courtesy_delay.is_zero() {
            sleep(self.courtesy_delay).await;
        }
    }

    async fn search_ids(&self, term: &str) -> Result<Vec<String>, SearchError> {
        let (min_year, max_year) = year_range(self.year_window);
        let query = format!("{} AND ({}:{}[pdat])", term, min_year, max_year);
        let retmax = self.max_results.to_string();
        let request = self.request(
            "esearch.fcgi",
            &[
                ("db", "pubmed"),
                ("term", query.as_str()),
                ("retmode", "json"),
                ("retmax", retmax.as_str()),
                ("sort", "relevance"),
            ],
        );
        let response: ESearchResponse = get_json(request, self.name()).await?;
        Ok(response.esearchresult.idlist)
    }

    async fn fetch_summaries(&self, ids: &str) -> Result<Vec<(String, DocumentSummary)>, SearchError> {
        let request = self.request(
            "esummary.fcgi",
            &[("db", "pubmed"), ("id", ids), ("retmode", "json")],
        );
        let response: ESummaryResponse = get_json(request, self.name()).await?;

        let uids: Vec<String> = response
            .result
            .get("uids")
            .and_then(Value::as_array)
            .map(|uids| {
                uids.iter()
                    .filter_map(|u| u.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();

        let mut summaries = Vec::with_capacity(uids.len());
        for uid in uids {
            let Some(entry) = response.result.get(&uid) else {
                continue;
            };
            match serde_json::from_value::<DocumentSummary>(entry.clone()) {
                Ok(summary) => summaries.push((uid, summary)),
                Err(e) => debug!(uid = %uid, error = %e, "Skipping malformed PubMed summary"),
            }
        }
        Ok(summaries)
    }

    async fn fetch_abstracts(&self, ids: &str) -> Result<HashMap<String, String>, SearchError> {
        let request = self.request(
            "efetch.fcgi",
            &[("db", "pubmed"), ("id", ids), ("retmode", "xml")],
        );
        let xml = get_text(request, self.name()).await?;
        Ok(extract_abstracts(&xml))
    }
}

/// Map PMID to a cleaned abstract, truncated to [`ABSTRACT_CHAR_LIMIT`].
///
/// Structured abstracts (several `<AbstractText Label=...>` sections) are
/// joined in document order. Inline markup such as `<i>` is dropped and
/// entity references, numeric ones included, are decoded. Only the first
/// `PMID` of an article counts; later ones belong to comments and
/// corrections. Malformed XML keeps whatever was parsed before the error.
pub fn extract_abstracts(xml: &str) -> HashMap<String, String> {
    let mut abstracts = HashMap::new();
    let mut reader = Reader::from_str(xml);

    let mut pmid: Option<String> = None;
    let mut sections: Vec<String> = Vec::new();
    let mut section = String::new();
    let mut in_article = false;
    let mut in_pmid = false;
    let mut in_abstract = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"PubmedArticle" => {
                    in_article = true;
                    pmid = None;
                    sections.clear();
                }
                b"PMID" if in_article && pmid.is_none() => in_pmid = true,
                b"AbstractText" if in_article => {
                    in_abstract = true;
                    section.clear();
                }
                _ => {}
            },
            Ok(Event::Text(e)) if in_pmid || in_abstract => match e.unescape() {
                Ok(text) if in_pmid => pmid = Some(text.trim().to_string()),
                Ok(text) => section.push_str(&text),
                Err(err) => debug!(error = %err, "Skipping undecodable text in efetch XML"),
            },
            Ok(Event::CData(e)) if in_abstract => {
                section.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"PMID" => in_pmid = false,
                b"AbstractText" if in_abstract => {
                    in_abstract = false;
                    let text = collapse_whitespace(&section);
                    if !text.is_empty() {
                        sections.push(text);
                    }
                }
                b"PubmedArticle" => {
                    in_article = false;
                    let id = pmid.take().filter(|id| !id.is_empty());
                    if let Some(id) = id.filter(|_| !sections.is_empty()) {
                        abstracts.insert(id, truncate_chars(&sections.join(" "), ABSTRACT_CHAR_LIMIT));
                    }
                    sections.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => {
                debug!(error = %e, parsed = abstracts.len(), "Malformed efetch XML, stopping");
                break;
            }
            _ => {}
        }
    }

    abstracts
}

#[async_trait]
impl SearchBackend for PubMedBackend {
    fn name(&self) -> &'static str {
        "PubMed"
    }

    async fn search(&self, term: &str) -> Result<Vec<RawHit>, SearchError> {
        info!(query = %term, "Searching PubMed");

        let ids = self.search_ids(term).await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_list = ids.join(",");

        self.pause().await;
        let summaries = self.fetch_summaries(&id_list).await?;

        self.pause().await;
        let abstracts = match self.fetch_abstracts(&id_list).await {
            Ok(abstracts) => abstracts,
            Err(e) => {
                warn!(error = %e, "PubMed abstract fetch failed, continuing without abstracts");
                HashMap::new()
            }
        };

        Ok(summaries
            .into_iter()
            .take(self.max_results)
            .map(|(uid, summary)| {
                let has_full_text = summary
                    .articleids
                    .iter()
                    .any(|id| id.idtype == "pmc" && !id.value.is_empty());
                let authors = summary
                    .authors
                    .iter()
                    .map(|a| a.name.as_str())
                    .filter(|n| !n.is_empty())
                    .collect::<Vec<_>>()
                    .join(", ");
                let snippet = abstracts
                    .get(&uid)
                    .cloned()
                    .unwrap_or_else(|| MISSING_ABSTRACT.to_string());

                RawHit {
                    title: Some(summary.title),
                    url: format!("https://pubmed.ncbi.nlm.nih.gov/{}/", uid),
                    snippet: Some(snippet),
                    authors: Some(authors).filter(|a| !a.is_empty()),
                    year: summary.pubdate.split_whitespace().next().map(String::from),
                    has_full_text,
                    ..RawHit::default()
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const EFETCH_XML: &str = r#"<?xml version="1.0" ?>
<PubmedArticleSet>
<PubmedArticle>
  <MedlineCitation Status="MEDLINE" Owner="NLM">
    <PMID Version="1">39000001</PMID>
    <Article>
      <Abstract>
        <AbstractText Label="BACKGROUND">Preoperative <i>anemia</i> is common &amp; costly.</AbstractText>
        <AbstractText Label="RESULTS">Transfusions fell by 30%.</AbstractText>
      </Abstract>
    </Article>
  </MedlineCitation>
</PubmedArticle>
<PubmedArticle>
  <MedlineCitation Status="MEDLINE" Owner="NLM">
    <PMID Version="1">39000002</PMID>
    <Article><ArticleTitle>No abstract here</ArticleTitle></Article>
  </MedlineCitation>
</PubmedArticle>
</PubmedArticleSet>"#;

    #[test]
    fn test_extract_abstracts_joins_sections_and_strips_markup() {
        let abstracts = extract_abstracts(EFETCH_XML);
        assert_eq!(abstracts.len(), 1);
        assert_eq!(
            abstracts["39000001"],
            "Preoperative anemia is common & costly. Transfusions fell by 30%."
        );
    }

    #[test]
    fn test_extract_abstracts_truncates() {
        let long = "a".repeat(ABSTRACT_CHAR_LIMIT + 200);
        let xml = format!(
            "<PubmedArticle><PMID>1</PMID><AbstractText>{}</AbstractText></PubmedArticle>",
            long
        );
        assert_eq!(extract_abstracts(&xml)["1"].chars().count(), ABSTRACT_CHAR_LIMIT);
    }

    #[test]
    fn test_extract_abstracts_decodes_character_references() {
        let xml = "<PubmedArticle><PMID>7</PMID><AbstractText>Hb &#x2265; 13 g/dL in 45&#8201;% of patients</AbstractText></PubmedArticle>";
        let text = &extract_abstracts(xml)["7"];
        assert!(!text.contains("&#"));
        assert_eq!(text, "Hb \u{2265} 13 g/dL in 45 % of patients");
    }

    #[test]
    fn test_extract_abstracts_uses_article_pmid() {
        let xml = r#"<PubmedArticle>
  <MedlineCitation><PMID Version="1">100</PMID>
    <Article><Abstract><AbstractText>Own abstract.</AbstractText></Abstract></Article>
    <CommentsCorrectionsList>
      <CommentsCorrections RefType="CommentIn"><PMID Version="1">200</PMID></CommentsCorrections>
    </CommentsCorrectionsList>
  </MedlineCitation>
</PubmedArticle>"#;
        let abstracts = extract_abstracts(xml);
        assert_eq!(abstracts.len(), 1);
        assert_eq!(abstracts["100"], "Own abstract.");
    }

    #[test]
    fn test_extract_abstracts_ignores_garbage() {
        assert!(extract_abstracts("").is_empty());
        assert!(extract_abstracts("<html>Service unavailable</html>").is_empty());
    }

    #[tokio::test]
    async fn test_three_step_search() {
        let mut server = mockito::Server::new_async().await;
        let esearch = server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("db".into(), "pubmed".into()),
                Matcher::UrlEncoded("tool".into(), TOOL_NAME.into()),
                Matcher::UrlEncoded("email".into(), "ops@example.org".into()),
                Matcher::Regex("pdat".into()),
            ]))
            .with_body(r#"{"esearchresult": {"count": "2", "idlist": ["39000001", "39000002"]}}"#)
            .create_async()
            .await;
        let esummary = server
            .mock("GET", "/esummary.fcgi")
            .match_query(Matcher::UrlEncoded("id".into(), "39000001,39000002".into()))
            .with_body(
                r#"{"result": {
                    "uids": ["39000001", "39000002"],
                    "39000001": {"uid": "39000001", "pubdate": "2024 Feb",
                        "title": "Anemia management without transfusion.",
                        "authors": [{"name": "Silva A"}, {"name": "Costa B"}],
                        "articleids": [{"idtype": "pubmed", "value": "39000001"},
                                       {"idtype": "pmc", "value": "PMC1100001"}]},
                    "39000002": {"uid": "39000002", "pubdate": "2023",
                        "title": "Cell salvage in obstetrics.", "authors": [], "articleids": []}
                }}"#,
            )
            .create_async()
            .await;
        let efetch = server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::UrlEncoded("retmode".into(), "xml".into()))
            .with_body(EFETCH_XML)
            .create_async()
            .await;

        let backend = PubMedBackend::new(Client::new(), 5, 4)
            .with_base_url(server.url())
            .with_courtesy_delay(Duration::ZERO)
            .with_credentials(None, Some("ops@example.org".to_string()));
        let hits = backend.search("\"Cell salvage\"").await.unwrap();

        esearch.assert_async().await;
        esummary.assert_async().await;
        efetch.assert_async().await;

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://pubmed.ncbi.nlm.nih.gov/39000001/");
        assert_eq!(hits[0].year.as_deref(), Some("2024"));
        assert_eq!(hits[0].authors.as_deref(), Some("Silva A, Costa B"));
        assert!(hits[0].has_full_text);
        assert!(hits[0].snippet.as_deref().unwrap().starts_with("Preoperative anemia"));
        assert!(!hits[1].has_full_text);
        assert_eq!(hits[1].snippet.as_deref(), Some(MISSING_ABSTRACT));
    }

    #[tokio::test]
    async fn test_efetch_failure_keeps_summaries() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_body(r#"{"esearchresult": {"idlist": ["1"]}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/esummary.fcgi")
            .match_query(Matcher::Any)
            .with_body(r#"{"result": {"uids": ["1"], "1": {"title": "T", "pubdate": "2025"}}}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/efetch.fcgi")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let backend = PubMedBackend::new(Client::new(), 5, 4)
            .with_base_url(server.url())
            .with_courtesy_delay(Duration::ZERO);
        let hits = backend.search("anemia").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].snippet.as_deref(), Some(MISSING_ABSTRACT));
    }

    #[tokio::test]
    async fn test_empty_id_list_short_circuits() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/esearch.fcgi")
            .match_query(Matcher::Any)
            .with_body(r#"{"esearchresult": {"idlist": []}}"#)
            .create_async()
            .await;
        let summary = server
            .mock("GET", "/esummary.fcgi")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let backend = PubMedBackend::new(Client::new(), 5, 4)
            .with_base_url(server.url())
            .with_courtesy_delay(Duration::ZERO);
        assert!(backend.search("nothing").await.unwrap().is_empty());
        summary.assert_async().await;
    }
}
