//! Europe PMC REST search.
//!
//! Single JSON call. The publication-year window is embedded in the query
//! string (`PUB_YEAR:[MIN TO MAX]`) and results are sorted newest first.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::info;

use super::normalize::strip_markup;
use super::{get_json, year_range, RawHit, SearchBackend, SearchError};

const EUROPE_PMC_SEARCH_URL: &str = "https://www.ebi.ac.uk/europepmc/webservices/rest/search";
const MISSING_ABSTRACT: &str = "Resumo não disponível.";

pub struct EuropePmcBackend {
    client: Client,
    base_url: String,
    max_results: usize,
    year_window: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EuropePmcResponse {
    #[serde(default)]
    result_list: ResultList,
}

#[derive(Debug, Default, Deserialize)]
struct ResultList {
    #[serde(default)]
    result: Vec<EuropePmcResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EuropePmcResult {
    title: Option<String>,
    author_string: Option<String>,
    pub_year: Option<String>,
    abstract_text: Option<String>,
    doi: Option<String>,
    pmid: Option<String>,
    pmcid: Option<String>,
    id: Option<String>,
    is_open_access: Option<String>,
}

impl EuropePmcBackend {
    pub fn new(client: Client, max_results: usize, year_window: i32) -> Self {
        Self {
            client,
            base_url: EUROPE_PMC_SEARCH_URL.to_string(),
            max_results,
            year_window,
        }
    }

    /// Point the backend at a different endpoint (used by tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn into_hit(result: EuropePmcResult) -> Option<RawHit> {
        let url = match (&result.doi, result.pmid.as_ref().or(result.id.as_ref())) {
            (Some(doi), _) if !doi.trim().is_empty() => format!("https://doi.org/{}", doi.trim()),
            (_, Some(pmid)) => format!("https://europepmc.org/article/med/{}", pmid),
            _ => return None,
        };

        let snippet = result
            .abstract_text
            .as_deref()
            .map(strip_markup)
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| MISSING_ABSTRACT.to_string());

        let has_full_text = result.is_open_access.as_deref() == Some("Y")
            || result.pmcid.as_deref().is_some_and(|p| !p.is_empty());

        Some(RawHit {
            title: result.title.as_deref().map(strip_markup),
            url,
            snippet: Some(snippet),
            authors: result.author_string,
            year: result.pub_year,
            has_full_text,
            ..RawHit::default()
        })
    }
}

#[async_trait]
impl SearchBackend for EuropePmcBackend {
    fn name(&self) -> &'static str {
        "Europe PMC"
    }

    async fn search(&self, term: &str) -> Result<Vec<RawHit>, SearchError> {
        let (min_year, max_year) = year_range(self.year_window);
        let query = format!("{} AND PUB_YEAR:[{} TO {}]", term, min_year, max_year);
        info!(query = %query, "Searching Europe PMC");

        let page_size = self.max_results.to_string();
        let request = self.client.get(&self.base_url).query(&[
            ("query", query.as_str()),
            ("format", "json"),
            ("pageSize", page_size.as_str()),
            ("resultType", "core"),
            ("sort", "P_PDATE_D desc"),
        ]);
        let response: EuropePmcResponse = get_json(request, self.name()).await?;

        Ok(response
            .result_list
            .result
            .into_iter()
            .filter_map(Self::into_hit)
            .take(self.max_results)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    const BODY: &str = r#"{
        "hitCount": 3,
        "resultList": {"result": [
            {"id": "38000001", "pmid": "38000001", "doi": "10.1000/pbm.2024.1",
             "title": "Patient blood management in <i>cardiac</i> surgery",
             "authorString": "Silva A, Costa B.", "pubYear": "2024",
             "abstractText": "<h4>Background</h4>Anemia is common.", "isOpenAccess": "N",
             "pmcid": "PMC1100001"},
            {"id": "38000002", "pmid": "38000002", "title": "Cell salvage",
             "pubYear": "2023", "isOpenAccess": "Y"},
            {"title": "No identifiers at all"}
        ]}
    }"#;

    fn backend(server: &mockito::ServerGuard) -> EuropePmcBackend {
        EuropePmcBackend::new(Client::new(), 5, 4).with_base_url(format!("{}/search", server.url()))
    }

    #[tokio::test]
    async fn test_search_maps_results() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/search")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("format".into(), "json".into()),
                Matcher::UrlEncoded("pageSize".into(), "5".into()),
                Matcher::Regex("PUB_YEAR".into()),
            ]))
            .with_status(200)
            .with_body(BODY)
            .create_async()
            .await;

        let hits = backend(&server).search("\"Blood conservation\"").await.unwrap();
        mock.assert_async().await;

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://doi.org/10.1000/pbm.2024.1");
        assert_eq!(hits[0].title.as_deref(), Some("Patient blood management in cardiac surgery"));
        assert_eq!(hits[0].snippet.as_deref(), Some("Background Anemia is common."));
        assert!(hits[0].has_full_text);
        assert_eq!(hits[1].url, "https://europepmc.org/article/med/38000002");
        assert_eq!(hits[1].snippet.as_deref(), Some(MISSING_ABSTRACT));
        assert!(hits[1].has_full_text);
    }

    #[tokio::test]
    async fn test_non_success_status_is_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/search")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let err = backend(&server).search("anemia").await.unwrap_err();
        assert!(matches!(err, SearchError::Status { status: 503, .. }));
        assert!(backend(&server).fetch("anemia").await.is_empty());
    }
}
