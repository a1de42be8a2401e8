use anyhow::{bail, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::search::reputability::ReputabilityScope;

/// Backends that can be named in `SEARCH_BACKENDS`.
pub const KNOWN_BACKENDS: &[&str] = &[
    "europepmc",
    "semanticscholar",
    "pubmed",
    "google",
    "duckduckgo",
    "static",
];

const DEFAULT_BACKENDS: &str = "europepmc,semanticscholar,pubmed";

const DEFAULT_SEARCH_TERMS: &[&str] = &[
    "\"Patient Blood Management\" AND surgery",
    "\"Bloodless surgery\" techniques",
    "\"Anemia management\" AND \"without transfusion\"",
];

const DEFAULT_LANGUAGE_TERMS: &[&str] = &["medicina sem sangue", "gestão de sangue do paciente"];

const DEFAULT_LANGUAGE_KEYWORDS: &[&str] = &[
    "medicina",
    "sangue",
    "transfusão",
    "paciente",
    "tratamento",
    "hospital",
    "cirurgia",
    "anemia",
    "portugal",
    "saúde",
];

pub const DEFAULT_REPUTABLE_SOURCES: &[&str] = &[
    "pmc.ncbi.nlm.nih.gov",
    "pubmed.ncbi.nlm.nih.gov",
    "aabb.org",
    "who.int",
    "ashpublications.org",
    "sciencedirect.com",
    "link.springer.com",
    "jmir.org",
    "researchgate.net",
    "nejm.org",
    "thelancet.com",
    "bmj.com",
    "jamanetwork.com",
    "nature.com",
    "frontiersin.org",
    "plos.org",
    "mdpi.com",
    "biomedcentral.com",
];

pub const DEFAULT_EXCLUDED_SOURCES: &[&str] = &[
    "actamedicaportuguesa.com",
    "scielo.pt",
    "revportcardiologia.pt",
    "rpmgf.pt",
    "spmi.pt",
    "ordemdosmedicos.pt",
    "apmc.pt",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub storage: StorageConfig,
    pub email: EmailConfig,
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    pub cors_allowed_origins: Vec<String>,
    pub log_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Backend names in fan-out order. Order decides which duplicate survives.
    pub backends: Vec<String>,
    /// Primary-language terms, searched first.
    pub terms: Vec<String>,
    /// Target-locale terms, searched after `terms`.
    pub language_terms: Vec<String>,
    pub language_keywords: Vec<String>,
    pub max_results: usize,
    pub per_backend_limit: usize,
    pub year_window: i32,
    pub http_timeout: Duration,
    pub courtesy_delay: Duration,
    pub reputable_sources: Vec<String>,
    pub excluded_sources: Vec<String>,
    pub reputability_scope: ReputabilityScope,
    pub ncbi_api_key: Option<String>,
    pub ncbi_email: Option<String>,
    pub semantic_scholar_api_key: Option<String>,
    pub google_api_key: Option<String>,
    pub google_cse_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub max_articles: usize,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub brevo_api_key: Option<String>,
    pub sender_email: String,
    pub sender_name: String,
    pub recipient_email: String,
    pub recipient_name: String,
}

#[derive(Debug, Clone)]
pub struct ScheduleConfig {
    pub enabled: bool,
    pub search_interval: Duration,
    pub check_interval: Duration,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backends: split_list(DEFAULT_BACKENDS, ','),
            terms: owned(DEFAULT_SEARCH_TERMS),
            language_terms: owned(DEFAULT_LANGUAGE_TERMS),
            language_keywords: owned(DEFAULT_LANGUAGE_KEYWORDS),
            max_results: 30,
            per_backend_limit: 5,
            year_window: 4,
            http_timeout: Duration::from_secs(10),
            courtesy_delay: Duration::from_millis(350),
            reputable_sources: owned(DEFAULT_REPUTABLE_SOURCES),
            excluded_sources: owned(DEFAULT_EXCLUDED_SOURCES),
            reputability_scope: ReputabilityScope::Unvetted,
            ncbi_api_key: None,
            ncbi_email: None,
            semantic_scholar_api_key: None,
            google_api_key: None,
            google_cse_id: None,
        }
    }
}

impl SearchConfig {
    /// All terms in search order: primary-language terms, then target-locale terms.
    pub fn all_terms(&self) -> Vec<String> {
        self.terms
            .iter()
            .chain(self.language_terms.iter())
            .cloned()
            .collect()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = SearchConfig::default();

        let config = Self {
            server: ServerConfig {
                port: get("PORT").unwrap_or_else(|| "3000".to_string()).parse()?,
                host: get("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                cors_allowed_origins: split_list(
                    &get("ALLOWED_ORIGINS").unwrap_or_else(|| "*".to_string()),
                    ',',
                ),
                log_dir: get("LOG_DIR").map(PathBuf::from),
            },
            search: SearchConfig {
                backends: get("SEARCH_BACKENDS")
                    .map(|v| split_list(&v.to_lowercase(), ','))
                    .unwrap_or(defaults.backends),
                terms: get("SEARCH_TERMS")
                    .map(|v| split_list(&v, '|'))
                    .unwrap_or(defaults.terms),
                language_terms: get("LANGUAGE_TERMS")
                    .map(|v| split_list(&v, '|'))
                    .unwrap_or(defaults.language_terms),
                language_keywords: get("LANGUAGE_KEYWORDS")
                    .map(|v| split_list(&v.to_lowercase(), ','))
                    .unwrap_or(defaults.language_keywords),
                max_results: parse_or(get("MAX_RESULTS"), defaults.max_results)?,
                per_backend_limit: parse_or(get("PER_BACKEND_LIMIT"), defaults.per_backend_limit)?,
                year_window: parse_or(get("YEAR_WINDOW"), defaults.year_window)?,
                http_timeout: Duration::from_secs(parse_or(get("HTTP_TIMEOUT_SECS"), 10)?),
                courtesy_delay: Duration::from_millis(parse_or(get("COURTESY_DELAY_MS"), 350)?),
                reputable_sources: get("REPUTABLE_SOURCES")
                    .map(|v| split_list(&v.to_lowercase(), ','))
                    .unwrap_or(defaults.reputable_sources),
                excluded_sources: get("EXCLUDED_SOURCES")
                    .map(|v| split_list(&v.to_lowercase(), ','))
                    .unwrap_or(defaults.excluded_sources),
                reputability_scope: match get("REPUTABILITY_SCOPE") {
                    Some(v) => v.parse()?,
                    None => defaults.reputability_scope,
                },
                ncbi_api_key: get("NCBI_API_KEY"),
                ncbi_email: get("NCBI_EMAIL"),
                semantic_scholar_api_key: get("SEMANTIC_SCHOLAR_API_KEY"),
                google_api_key: get("GOOGLE_API_KEY"),
                google_cse_id: get("GOOGLE_CSE_ID"),
            },
            storage: StorageConfig {
                data_dir: get("DATA_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(default_data_dir),
                max_articles: parse_or(get("MAX_STORED_ARTICLES"), 100)?,
            },
            email: EmailConfig {
                brevo_api_key: get("BREVO_API_KEY"),
                sender_email: get("EMAIL_SENDER")
                    .unwrap_or_else(|| "monitor@localhost".to_string()),
                sender_name: get("EMAIL_SENDER_NAME")
                    .unwrap_or_else(|| "Monitor Medicina Sem Sangue".to_string()),
                recipient_email: get("EMAIL_RECIPIENT")
                    .unwrap_or_else(|| "digest@localhost".to_string()),
                recipient_name: get("EMAIL_RECIPIENT_NAME").unwrap_or_default(),
            },
            schedule: ScheduleConfig {
                enabled: parse_or(get("SCHEDULE_ENABLED"), false)?,
                search_interval: scaled_secs(
                    "SEARCH_INTERVAL_DAYS",
                    parse_or(get("SEARCH_INTERVAL_DAYS"), 7)?,
                    24 * 60 * 60,
                )?,
                check_interval: scaled_secs(
                    "SCHEDULE_CHECK_MINUTES",
                    parse_or(get("SCHEDULE_CHECK_MINUTES"), 60)?,
                    60,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let search = &self.search;
        if search.max_results == 0 {
            bail!("MAX_RESULTS must be greater than zero");
        }
        if search.per_backend_limit == 0 {
            bail!("PER_BACKEND_LIMIT must be greater than zero");
        }
        if search.http_timeout.is_zero() {
            bail!("HTTP_TIMEOUT_SECS must be greater than zero");
        }
        if search.year_window < 0 {
            bail!("YEAR_WINDOW must not be negative");
        }
        if search.terms.is_empty() && search.language_terms.is_empty() {
            bail!("at least one search term is required");
        }
        if let Some(unknown) = search
            .backends
            .iter()
            .find(|b| !KNOWN_BACKENDS.contains(&b.as_str()))
        {
            bail!(
                "unknown search backend '{}' (expected one of: {})",
                unknown,
                KNOWN_BACKENDS.join(", ")
            );
        }
        if self.storage.max_articles == 0 {
            bail!("MAX_STORED_ARTICLES must be greater than zero");
        }
        if self.schedule.search_interval.is_zero() {
            bail!("SEARCH_INTERVAL_DAYS must be greater than zero");
        }
        if self.schedule.check_interval.is_zero() {
            bail!("SCHEDULE_CHECK_MINUTES must be greater than zero");
        }
        Ok(())
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("medlit-digest"))
        .unwrap_or_else(|| PathBuf::from("data"))
}

fn split_list(value: &str, separator: char) -> Vec<String> {
    value
        .split(separator)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

fn scaled_secs(key: &str, value: u64, unit_secs: u64) -> Result<Duration> {
    match value.checked_mul(unit_secs) {
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => bail!("{} is too large", key),
    }
}

fn parse_or<T>(value: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match value {
        Some(v) => Ok(v.trim().parse()?),
        None => Ok(default),
    }
}
