//! Multi-backend aggregation.
//!
//! For every term the configured backends are queried concurrently; terms are
//! processed one after another with a courtesy pause in between. The merged
//! hits are normalized, filtered, deduplicated and ranked.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::normalize::dedup_key;
use super::{build_backends, http_client, year_range, Normalizer, RawHit, ReputabilityPolicy};
use super::{SearchBackend, SearchError};
use crate::config::SearchConfig;
use crate::models::SearchRecord;

pub struct Aggregator {
    backends: Vec<Box<dyn SearchBackend>>,
    normalizer: Normalizer,
    policy: ReputabilityPolicy,
    year_window: i32,
    max_results: usize,
    term_delay: Duration,
}

impl Aggregator {
    pub fn new(backends: Vec<Box<dyn SearchBackend>>, config: &SearchConfig) -> Self {
        Self {
            backends,
            normalizer: Normalizer::new(&config.language_keywords),
            policy: ReputabilityPolicy::from_config(config),
            year_window: config.year_window,
            max_results: config.max_results,
            term_delay: config.courtesy_delay,
        }
    }

    /// Build the backends named in the configuration around one shared client.
    pub fn from_config(config: &SearchConfig) -> Result<Self, SearchError> {
        let client = http_client(config)?;
        let backends = build_backends(config, &client);
        info!(backends = ?backends.iter().map(|b| b.name()).collect::<Vec<_>>(), "Search backends ready");
        Ok(Self::new(backends, config))
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    /// Run every term against every backend and return the ranked top results.
    pub async fn search_all(&self, terms: &[String]) -> Vec<SearchRecord> {
        if self.backends.is_empty() {
            warn!("No search backends configured");
            return Vec::new();
        }

        let discovered_at = Utc::now();
        let mut records = Vec::new();

        for (i, term) in terms.iter().enumerate() {
            if i > 0 && !self.term_delay.is_zero() {
                sleep(self.term_delay).await;
            }
            let per_backend = join_all(self.backends.iter().map(|b| b.fetch(term))).await;
            for (backend, hits) in self.backends.iter().zip(per_backend) {
                records.extend(self.admit(backend.as_ref(), hits, discovered_at));
            }
        }

        let total = records.len();
        let mut records = dedupe(records);
        rank(&mut records);
        records.truncate(self.max_results);

        info!(
            terms = terms.len(),
            candidates = total,
            count = records.len(),
            "Aggregation completed"
        );
        records
    }

    /// Normalize one backend's hits and drop those failing the filters.
    fn admit(
        &self,
        backend: &dyn SearchBackend,
        hits: Vec<RawHit>,
        discovered_at: DateTime<Utc>,
    ) -> Vec<SearchRecord> {
        let vetted = backend.vetted();
        hits.into_iter()
            .filter_map(|hit| self.normalizer.normalize(hit, backend.name(), discovered_at))
            .filter(|record| {
                let keep = self.policy.admits(record, vetted)
                    && within_year_window(record.publication_year, self.year_window);
                if !keep {
                    debug!(backend = backend.name(), url = %record.url, "Filtered out record");
                }
                keep
            })
            .collect()
    }
}

/// Unknown years always pass.
pub fn within_year_window(year: Option<i32>, window: i32) -> bool {
    let (min, max) = year_range(window);
    year.map_or(true, |y| (min..=max).contains(&y))
}

/// Keep the first record for every normalized URL.
pub fn dedupe(records: Vec<SearchRecord>) -> Vec<SearchRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|record| seen.insert(dedup_key(&record.url)))
        .collect()
}

/// Language match first, then citations, then newest year.
pub fn compare_records(a: &SearchRecord, b: &SearchRecord) -> Ordering {
    b.language_match
        .cmp(&a.language_match)
        .then_with(|| b.citation_count.cmp(&a.citation_count))
        .then_with(|| {
            b.publication_year
                .unwrap_or(0)
                .cmp(&a.publication_year.unwrap_or(0))
        })
}

/// Stable sort by [`compare_records`].
pub fn rank(records: &mut [SearchRecord]) {
    records.sort_by(compare_records);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Citations;
    use crate::search::ReputabilityScope;
    use async_trait::async_trait;
    use chrono::Datelike;

    struct Fixed {
        name: &'static str,
        vetted: bool,
        hits: Vec<RawHit>,
    }

    #[async_trait]
    impl SearchBackend for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn vetted(&self) -> bool {
            self.vetted
        }

        async fn search(&self, _term: &str) -> Result<Vec<RawHit>, SearchError> {
            Ok(self.hits.clone())
        }
    }

    /// Returns a different hit per term.
    struct PerTerm;

    #[async_trait]
    impl SearchBackend for PerTerm {
        fn name(&self) -> &'static str {
            "PerTerm"
        }

        async fn search(&self, term: &str) -> Result<Vec<RawHit>, SearchError> {
            Ok(vec![
                hit(&format!("https://pubmed.ncbi.nlm.nih.gov/{}/", term.len()), "Per term"),
                hit("https://who.int/shared", "Shared"),
            ])
        }
    }

    struct Failing;

    #[async_trait]
    impl SearchBackend for Failing {
        fn name(&self) -> &'static str {
            "Failing"
        }

        async fn search(&self, _term: &str) -> Result<Vec<RawHit>, SearchError> {
            Err(SearchError::Status {
                backend: "Failing",
                status: 500,
            })
        }
    }

    struct Panicking;

    #[async_trait]
    impl SearchBackend for Panicking {
        fn name(&self) -> &'static str {
            "Panicking"
        }

        async fn search(&self, _term: &str) -> Result<Vec<RawHit>, SearchError> {
            panic!("adapter bug")
        }
    }

    fn hit(url: &str, title: &str) -> RawHit {
        RawHit {
            title: Some(title.to_string()),
            url: url.to_string(),
            ..RawHit::default()
        }
    }

    fn config() -> SearchConfig {
        SearchConfig {
            courtesy_delay: Duration::ZERO,
            ..SearchConfig::default()
        }
    }

    fn record(url: &str, language_match: bool, citations: Citations, year: Option<i32>) -> SearchRecord {
        SearchRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title: url.to_string(),
            url: url.to_string(),
            source_domain: "who.int".to_string(),
            source: "Test".to_string(),
            authors: None,
            snippet: String::new(),
            publication_year: year,
            citation_count: citations,
            language_match,
            has_full_text: false,
            discovered_at: Utc::now(),
        }
    }

    fn terms(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let first = record("https://www.WHO.int/pbm", false, Citations::Unknown, None);
        let second = record("https://who.int/pbm", true, Citations::Known(5), None);
        let other = record("https://who.int/other", false, Citations::Unknown, None);

        let deduped = dedupe(vec![first.clone(), second, other.clone()]);
        assert_eq!(deduped, vec![first.clone(), other.clone()]);
        assert_eq!(dedupe(deduped.clone()), deduped);
    }

    #[test]
    fn test_year_window_bounds() {
        let current = Utc::now().year();
        assert!(within_year_window(Some(current), 4));
        assert!(within_year_window(Some(current - 4), 4));
        assert!(!within_year_window(Some(current - 5), 4));
        assert!(!within_year_window(Some(current + 1), 4));
        assert!(within_year_window(None, 4));
    }

    #[test]
    fn test_rank_order() {
        let mut records = vec![
            record("https://a.org/old", false, Citations::Known(500), Some(2020)),
            record("https://a.org/pt", true, Citations::Unknown, Some(2021)),
            record("https://a.org/new", false, Citations::Known(500), Some(2024)),
            record("https://a.org/zero", false, Citations::Known(0), Some(2025)),
            record("https://a.org/unknown", false, Citations::Unknown, None),
        ];
        rank(&mut records);
        let urls: Vec<_> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://a.org/pt",
                "https://a.org/new",
                "https://a.org/old",
                "https://a.org/unknown",
                "https://a.org/zero",
            ]
        );
    }

    #[test]
    fn test_rank_is_stable_for_ties() {
        let mut records = vec![
            record("https://a.org/1", false, Citations::Unknown, None),
            record("https://a.org/2", false, Citations::Unknown, None),
            record("https://a.org/3", false, Citations::Unknown, None),
        ];
        rank(&mut records);
        let urls: Vec<_> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.org/1", "https://a.org/2", "https://a.org/3"]);
    }

    #[tokio::test]
    async fn test_failing_backend_does_not_empty_union() {
        let backends: Vec<Box<dyn SearchBackend>> = vec![
            Box::new(Failing),
            Box::new(Fixed {
                name: "Good",
                vetted: true,
                hits: vec![hit("https://pubmed.ncbi.nlm.nih.gov/1/", "One")],
            }),
        ];
        let aggregator = Aggregator::new(backends, &config());
        let records = aggregator.search_all(&terms(&["anemia"])).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "Good");
    }

    #[tokio::test]
    async fn test_panicking_backend_does_not_empty_union() {
        let backends: Vec<Box<dyn SearchBackend>> = vec![
            Box::new(Panicking),
            Box::new(Fixed {
                name: "Good",
                vetted: true,
                hits: vec![hit("https://pubmed.ncbi.nlm.nih.gov/1/", "One")],
            }),
        ];
        let aggregator = Aggregator::new(backends, &config());
        let records = tokio::spawn(async move { aggregator.search_all(&terms(&["t", "u"])).await })
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].source, "Good");
    }

    #[tokio::test]
    async fn test_no_backends_returns_empty() {
        let aggregator = Aggregator::new(Vec::new(), &config());
        assert!(aggregator.search_all(&terms(&["anemia"])).await.is_empty());
        assert!(aggregator.backend_names().is_empty());
    }

    #[tokio::test]
    async fn test_filters_apply_per_backend_vetting() {
        let current = Utc::now().year();
        let backends: Vec<Box<dyn SearchBackend>> = vec![
            Box::new(Fixed {
                name: "Web",
                vetted: false,
                hits: vec![
                    hit("https://evil.example.com/cure", "Miracle cure"),
                    hit("https://sub.who.int/guidance", "WHO guidance"),
                ],
            }),
            Box::new(Fixed {
                name: "Index",
                vetted: true,
                hits: vec![
                    hit("https://doi.org/10.1000/xyz", "Journal article"),
                    hit("https://www.scielo.pt/a", "Excluded journal"),
                    RawHit {
                        year: Some((current - 5).to_string()),
                        ..hit("https://doi.org/10.1000/old", "Too old")
                    },
                ],
            }),
        ];
        let aggregator = Aggregator::new(backends, &config());
        let records = aggregator.search_all(&terms(&["pbm"])).await;
        let urls: Vec<_> = records.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["https://sub.who.int/guidance", "https://doi.org/10.1000/xyz"]);
    }

    fn mixed_backends() -> Vec<Box<dyn SearchBackend>> {
        vec![
            Box::new(Fixed {
                name: "Web",
                vetted: false,
                hits: vec![
                    hit("https://evil.example.com/cure", "Miracle cure"),
                    hit("https://who.int/web", "WHO page"),
                ],
            }),
            Box::new(Fixed {
                name: "Index",
                vetted: true,
                hits: vec![
                    hit("https://doi.org/10.1000/xyz", "Journal article"),
                    hit("https://scielo.pt/a", "Excluded journal"),
                ],
            }),
        ]
    }

    async fn urls_with_scope(scope: ReputabilityScope) -> Vec<String> {
        let config = SearchConfig {
            reputability_scope: scope,
            ..config()
        };
        Aggregator::new(mixed_backends(), &config)
            .search_all(&terms(&["pbm"]))
            .await
            .into_iter()
            .map(|r| r.url)
            .collect()
    }

    #[tokio::test]
    async fn test_scope_all_applies_allowlist_to_vetted_backends() {
        assert_eq!(urls_with_scope(ReputabilityScope::All).await, vec!["https://who.int/web"]);
    }

    #[tokio::test]
    async fn test_scope_off_keeps_only_blocklist() {
        assert_eq!(
            urls_with_scope(ReputabilityScope::Off).await,
            vec![
                "https://evil.example.com/cure",
                "https://who.int/web",
                "https://doi.org/10.1000/xyz",
            ]
        );
    }

    #[tokio::test]
    async fn test_two_sources_two_terms_with_overlap() {
        let backends: Vec<Box<dyn SearchBackend>> = vec![
            Box::new(PerTerm),
            Box::new(Fixed {
                name: "Second",
                vetted: true,
                hits: vec![
                    hit("https://www.who.int/shared", "Shared again"),
                    RawHit {
                        citations: Citations::Known(10),
                        ..hit("https://pmc.ncbi.nlm.nih.gov/articles/PMC9/", "Cited")
                    },
                ],
            }),
        ];
        let aggregator = Aggregator::new(backends, &config());
        let records = aggregator.search_all(&terms(&["abc", "abcdef"])).await;

        // 2 per-term URLs + shared + cited
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].url, "https://pmc.ncbi.nlm.nih.gov/articles/PMC9/");
        let shared: Vec<_> = records.iter().filter(|r| r.url.contains("who.int")).collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(shared[0].source, "PerTerm");
        assert_eq!(shared[0].title, "Shared");
        assert!(records.iter().all(|r| r.discovered_at == records[0].discovered_at));
        assert_eq!(aggregator.backend_names(), vec!["PerTerm", "Second"]);
    }

    #[tokio::test]
    async fn test_results_are_truncated() {
        let hits = (0..10)
            .map(|i| hit(&format!("https://who.int/{}", i), "Item"))
            .collect();
        let backends: Vec<Box<dyn SearchBackend>> = vec![Box::new(Fixed {
            name: "Many",
            vetted: true,
            hits,
        })];
        let config = SearchConfig {
            max_results: 3,
            ..config()
        };
        let records = Aggregator::new(backends, &config)
            .search_all(&terms(&["pbm"]))
            .await;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].url, "https://who.int/0");
    }
}
