//! JSON file persistence
//!
//! Two documents live under the data directory:
//! - `last-search.json`: when the last run happened and when the next is due
//! - `articles.json`: a bounded, newest-first window of previously seen records
//!
//! Reads never fail: a missing or corrupt file yields the default document.
//! Writes go to a temp file in the same directory that is then renamed over
//! the target, so readers see either the old or the new document.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{Config, StorageConfig};
use crate::models::{ArticlesData, LastSearchData, SearchRecord};
use crate::search::normalize::dedup_key;

const LAST_SEARCH_FILE: &str = "last-search.json";
const ARTICLES_FILE: &str = "articles.json";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub struct ArticleStore {
    dir: PathBuf,
    max_articles: usize,
    search_interval: Duration,
    write_lock: Mutex<()>,
}

impl ArticleStore {
    pub fn new(dir: impl Into<PathBuf>, max_articles: usize) -> Self {
        Self {
            dir: dir.into(),
            max_articles,
            search_interval: Duration::from_secs(7 * 24 * 60 * 60),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let StorageConfig { data_dir, max_articles } = &config.storage;
        Self::new(data_dir.clone(), *max_articles)
            .with_search_interval(config.schedule.search_interval)
    }

    /// Interval used for `nextScheduledSearch` and [`ArticleStore::needs_search`].
    pub fn with_search_interval(mut self, interval: Duration) -> Self {
        self.search_interval = interval;
        self
    }

    pub async fn read_last_search(&self) -> LastSearchData {
        read_or_default(&self.dir.join(LAST_SEARCH_FILE)).await
    }

    pub async fn read_articles(&self) -> ArticlesData {
        read_or_default(&self.dir.join(ARTICLES_FILE)).await
    }

    /// Merge a run's records into the stored window and record the run.
    ///
    /// Records whose URL is already stored are ignored. The merged list is
    /// ordered newest `discoveredAt` first and pruned to `max_articles`.
    pub async fn save_results(
        &self,
        records: &[SearchRecord],
        sources: &[String],
    ) -> Result<ArticlesData, StorageError> {
        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.dir).await?;

        let existing = self.read_articles().await;
        let mut seen: HashSet<String> = existing
            .articles
            .iter()
            .map(|a| dedup_key(&a.url))
            .collect();

        let fresh: Vec<SearchRecord> = records
            .iter()
            .filter(|r| seen.insert(dedup_key(&r.url)))
            .cloned()
            .collect();
        let added = fresh.len();

        let mut merged = fresh;
        merged.extend(existing.articles);
        merged.sort_by(|a, b| b.discovered_at.cmp(&a.discovered_at));
        merged.truncate(self.max_articles);

        let now = Utc::now();
        let last_search = LastSearchData {
            last_search_timestamp: Some(now),
            next_scheduled_search: Some(now + interval(self.search_interval)),
            articles_found: records.len(),
            sources_searched: sources.to_vec(),
        };
        let articles = ArticlesData {
            articles: merged,
            last_updated: Some(now),
        };

        // The run only counts once its articles are on disk.
        write_atomic(&self.dir.join(ARTICLES_FILE), &articles).await?;
        write_atomic(&self.dir.join(LAST_SEARCH_FILE), &last_search).await?;

        info!(
            added,
            stored = articles.articles.len(),
            dir = %self.dir.display(),
            "Search results saved"
        );
        Ok(articles)
    }

    /// True when no run was recorded or the last one is at least one interval old.
    pub async fn needs_search(&self, now: DateTime<Utc>) -> bool {
        match self.read_last_search().await.last_search_timestamp {
            Some(last) => now - last >= interval(self.search_interval),
            None => true,
        }
    }

    /// Stored records discovered in the seven days before `now`.
    pub async fn weekly_articles(&self, now: DateTime<Utc>) -> Vec<SearchRecord> {
        let cutoff = now - chrono::Duration::days(7);
        self.read_articles()
            .await
            .articles
            .into_iter()
            .filter(|a| a.discovered_at >= cutoff)
            .collect()
    }
}

fn interval(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::days(7))
}

async fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    let content = match fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No stored document yet, using defaults");
            return T::default();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read stored document, using defaults");
            return T::default();
        }
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "Stored document is corrupt, using defaults");
        T::default()
    })
}

async fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), StorageError> {
    let content = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, content).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}
