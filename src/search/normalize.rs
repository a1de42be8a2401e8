//! Normalization of raw backend hits into [`SearchRecord`]s.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use quick_xml::escape::unescape;
use regex::Regex;
use reqwest::Url;
use tracing::debug;

use super::reputability::normalize_host;
use super::RawHit;
use crate::models::SearchRecord;

pub const UNTITLED: &str = "Untitled";

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag pattern is valid"));
static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Turns raw hits into records and flags target-locale matches.
#[derive(Debug, Clone)]
pub struct Normalizer {
    keywords: Vec<String>,
}

impl Normalizer {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    pub fn language_match(&self, title: &str, snippet: &str) -> bool {
        let text = format!("{} {}", title, snippet).to_lowercase();
        self.keywords.iter().any(|k| text.contains(k.as_str()))
    }

    /// Returns `None` when the hit has no usable absolute http(s) URL.
    pub fn normalize(
        &self,
        hit: RawHit,
        source: &str,
        discovered_at: DateTime<Utc>,
    ) -> Option<SearchRecord> {
        let url = hit.url.trim().to_string();
        let source_domain = match parse_absolute(&url).as_ref().and_then(source_domain) {
            Some(domain) => domain,
            None => {
                debug!(source, url = %url, "Dropping hit without a valid URL");
                return None;
            }
        };

        let title = hit
            .title
            .map(|t| collapse_whitespace(&t))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());
        let snippet = hit.snippet.map(|s| s.trim().to_string()).unwrap_or_default();
        let language_match = self.language_match(&title, &snippet);

        Some(SearchRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            url,
            source_domain,
            source: source.to_string(),
            authors: hit.authors.filter(|a| !a.trim().is_empty()),
            snippet,
            publication_year: hit.year.as_deref().and_then(parse_year),
            citation_count: hit.citations,
            language_match,
            has_full_text: hit.has_full_text,
            discovered_at,
        })
    }
}

/// Parse an absolute http(s) URL that has a host.
pub fn parse_absolute(url: &str) -> Option<Url> {
    let parsed = Url::parse(url).ok()?;
    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Some(parsed),
        _ => None,
    }
}

/// Lowercased host without a leading `www.`.
pub fn source_domain(url: &Url) -> Option<String> {
    url.host_str()
        .map(normalize_host)
        .filter(|h| !h.is_empty())
}

/// Key used to detect duplicate URLs: host compared case-insensitively and
/// without `www.`, everything else compared exactly.
pub fn dedup_key(url: &str) -> String {
    let Some(mut parsed) = parse_absolute(url) else {
        return url.trim().to_string();
    };
    if let Some(host) = parsed.host_str().map(normalize_host) {
        // Fails only for hosts that cannot be re-serialized; keep the parsed form then.
        let _ = parsed.set_host(Some(&host));
    }
    parsed.to_string()
}

/// First standalone 4-digit number in the text.
pub fn parse_year(raw: &str) -> Option<i32> {
    raw.split(|c: char| !c.is_ascii_digit())
        .find(|part| part.len() == 4)
        .and_then(|y| y.parse::<i32>().ok())
}

/// Remove markup, decode XML entity references and collapse whitespace.
///
/// Text carrying an undecodable reference (a bare `&`, an HTML-only entity)
/// is kept as it is.
pub fn strip_markup(text: &str) -> String {
    let without_tags = TAG_RE.replace_all(text, " ");
    match unescape(&without_tags) {
        Ok(decoded) => collapse_whitespace(&decoded),
        Err(e) => {
            debug!(error = %e, "Keeping text with undecodable entity");
            collapse_whitespace(&without_tags)
        }
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RE.replace_all(text, " ").trim().to_string()
}

/// Truncate to at most `limit` characters.
pub fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}
