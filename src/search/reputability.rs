//! Source reputability filtering.
//!
//! Hostnames are compared without a leading `www.`; an entry matches its own
//! host and every subdomain of it (`sub.who.int` matches `who.int`, while
//! `notwho.int` does not).

use std::str::FromStr;

use thiserror::Error;

use super::normalize::{parse_absolute, source_domain};
use crate::config::SearchConfig;
use crate::models::SearchRecord;

/// Which records the allowlist is applied to. The exclude-list always applies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReputabilityScope {
    /// Allowlist disabled.
    Off,
    /// Only records from unvetted (general web search) backends.
    #[default]
    Unvetted,
    /// Every record.
    All,
}

#[derive(Debug, Error)]
#[error("invalid reputability scope '{0}' (expected off, unvetted or all)")]
pub struct ParseScopeError(String);

impl FromStr for ReputabilityScope {
    type Err = ParseScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "off" | "none" => Ok(ReputabilityScope::Off),
            "unvetted" | "web" => Ok(ReputabilityScope::Unvetted),
            "all" => Ok(ReputabilityScope::All),
            other => Err(ParseScopeError(other.to_string())),
        }
    }
}

/// Lowercase and strip a leading `www.`.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().trim_end_matches('.').to_lowercase();
    match host.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => host,
    }
}

/// Exact match, or `host` is a subdomain of `entry`.
pub fn host_matches(host: &str, entry: &str) -> bool {
    let host = normalize_host(host);
    let entry = normalize_host(entry);
    if entry.is_empty() {
        return false;
    }
    host == entry
        || host
            .strip_suffix(entry.as_str())
            .is_some_and(|prefix| prefix.ends_with('.'))
}

fn matches_any(host: &str, entries: &[String]) -> bool {
    entries.iter().any(|entry| host_matches(host, entry))
}

/// Whether a host passes the blocklist and, when given, the allowlist.
///
/// `None` skips the allowlist; an empty allowlist admits every host that is
/// not blocked.
pub fn host_is_reputable(host: &str, allowlist: Option<&[String]>, blocklist: &[String]) -> bool {
    if matches_any(host, blocklist) {
        return false;
    }
    match allowlist {
        Some(allow) if !allow.is_empty() => matches_any(host, allow),
        _ => true,
    }
}

/// Whether a URL passes the block- and allowlists.
///
/// Malformed URLs are never reputable. An empty allowlist admits every host
/// that is not blocked.
pub fn is_reputable(url: &str, allowlist: &[String], blocklist: &[String]) -> bool {
    parse_absolute(url)
        .as_ref()
        .and_then(source_domain)
        .is_some_and(|host| host_is_reputable(&host, Some(allowlist), blocklist))
}

#[derive(Debug, Clone, Default)]
pub struct ReputabilityPolicy {
    pub allowlist: Vec<String>,
    pub blocklist: Vec<String>,
    pub scope: ReputabilityScope,
}

impl ReputabilityPolicy {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            allowlist: config.reputable_sources.clone(),
            blocklist: config.excluded_sources.clone(),
            scope: config.reputability_scope,
        }
    }

    fn allowlist_applies(&self, vetted: bool) -> bool {
        match self.scope {
            ReputabilityScope::Off => false,
            ReputabilityScope::Unvetted => !vetted,
            ReputabilityScope::All => true,
        }
    }

    /// Decide whether a normalized record from a (non-)vetted backend is kept.
    pub fn admits(&self, record: &SearchRecord, vetted: bool) -> bool {
        let allowlist = self
            .allowlist_applies(vetted)
            .then_some(self.allowlist.as_slice());
        host_is_reputable(&record.source_domain, allowlist, &self.blocklist)
    }
}
