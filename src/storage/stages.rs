//! Stage artifact keys and (de)serialization on top of a [`BlobStore`].
//!
//! One run writes `raw_<ts>.json`, `filtered_<ts>.json` and `ideas_<ts>.md`
//! under their prefixes. When stages are chained through the store, each
//! downstream key takes its timestamp from the upstream blob it consumed, so
//! the three artifacts of a run share one suffix.

use super::BlobStore;
use crate::config::Settings;
use crate::error::{PipelineError, Result};
use crate::models::Article;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use tracing::{info, instrument};

static TS_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"_(\d{8}_\d{6})\.[A-Za-z]+$").expect("valid timestamp regex"));

/// Extract the run timestamp from a stage key such as
/// `filtered/filtered_20250506_142501.json`.
pub fn timestamp_of(key: &str) -> Option<&str> {
    TS_SUFFIX
        .captures(key)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePrefixes {
    pub raw: String,
    pub filtered: String,
    pub ideas: String,
}

impl Default for StagePrefixes {
    fn default() -> Self {
        Self {
            raw: "raw/".to_string(),
            filtered: "filtered/".to_string(),
            ideas: "ideas/".to_string(),
        }
    }
}

impl From<&Settings> for StagePrefixes {
    fn from(settings: &Settings) -> Self {
        Self {
            raw: settings.raw_prefix.clone(),
            filtered: settings.filtered_prefix.clone(),
            ideas: settings.ideas_prefix.clone(),
        }
    }
}

/// Reads and writes the raw, filtered and ideas artifacts of a run.
///
/// # Examples
///
/// ```ignore
/// let stages = StageStore::new(store, StagePrefixes::default());
/// let key = stages.write_raw("20250506_142501", &articles).await?;
/// assert_eq!(key, "raw/raw_20250506_142501.json");
/// ```
#[derive(Clone)]
pub struct StageStore {
    store: Arc<dyn BlobStore>,
    prefixes: StagePrefixes,
}

impl StageStore {
    pub fn new(store: Arc<dyn BlobStore>, prefixes: StagePrefixes) -> Self {
        Self { store, prefixes }
    }

    pub fn location(&self) -> String {
        self.store.location()
    }

    pub fn raw_key(&self, ts: &str) -> String {
        format!("{}raw_{ts}.json", self.prefixes.raw)
    }

    pub fn filtered_key(&self, ts: &str) -> String {
        format!("{}filtered_{ts}.json", self.prefixes.filtered)
    }

    pub fn ideas_key(&self, ts: &str) -> String {
        format!("{}ideas_{ts}.md", self.prefixes.ideas)
    }

    /// Write `articles` as JSON under the raw prefix.
    ///
    /// # Returns
    ///
    /// The key written.
    pub async fn write_raw(&self, ts: &str, articles: &[Article]) -> Result<String> {
        let key = self.raw_key(ts);
        self.write_articles(&key, articles).await?;
        Ok(key)
    }

    pub async fn write_filtered(&self, ts: &str, articles: &[Article]) -> Result<String> {
        let key = self.filtered_key(ts);
        self.write_articles(&key, articles).await?;
        Ok(key)
    }

    #[instrument(level = "info", skip(self, digest), fields(bytes = digest.len()))]
    pub async fn write_ideas(&self, ts: &str, digest: &str) -> Result<String> {
        let key = self.ideas_key(ts);
        self.store
            .put(&key, digest.as_bytes().to_vec(), "text/markdown")
            .await?;
        info!(%key, location = %self.store.location(), "Wrote ideas markdown");
        Ok(key)
    }

    /// Latest raw artifact: its key and articles.
    pub async fn latest_raw(&self) -> Result<(String, Vec<Article>)> {
        self.read_latest(&self.prefixes.raw).await
    }

    /// Latest filtered artifact: its key and articles.
    pub async fn latest_filtered(&self) -> Result<(String, Vec<Article>)> {
        self.read_latest(&self.prefixes.filtered).await
    }

    #[instrument(level = "info", skip(self, articles), fields(count = articles.len()))]
    async fn write_articles(&self, key: &str, articles: &[Article]) -> Result<()> {
        let json = serde_json::to_vec(articles)?;
        self.store.put(key, json, "application/json").await?;
        info!(location = %self.store.location(), "Wrote {} articles", articles.len());
        Ok(())
    }

    async fn read_latest(&self, prefix: &str) -> Result<(String, Vec<Article>)> {
        let meta = self.store.latest(prefix).await?;
        let text = self.store.get_text(&meta.key).await?;
        let articles: Vec<Article> = serde_json::from_str(&text).map_err(|e| {
            PipelineError::Storage(format!("blob {} is not an article list: {e}", meta.key))
        })?;
        info!(key = %meta.key, count = articles.len(), "Read latest stage artifact");
        Ok((meta.key, articles))
    }
}

/// Timestamp suffix for a downstream artifact: taken from the upstream key,
/// or `fallback` when the key does not carry one.
pub fn derived_timestamp(upstream_key: &str, fallback: &str) -> String {
    timestamp_of(upstream_key)
        .map(str::to_string)
        .unwrap_or_else(|| fallback.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::BlobMeta;
    use crate::testing::{MemoryBlobStore, article};
    use chrono::{TimeZone, Utc};

    fn stage_store(mem: &Arc<MemoryBlobStore>) -> StageStore {
        StageStore::new(mem.clone(), StagePrefixes::default())
    }

    #[test]
    fn test_keys_and_timestamp_extraction() {
        let stages = stage_store(&Arc::new(MemoryBlobStore::default()));
        let ts = "20250506_142501";
        assert_eq!(stages.raw_key(ts), "raw/raw_20250506_142501.json");
        assert_eq!(stages.filtered_key(ts), "filtered/filtered_20250506_142501.json");
        assert_eq!(stages.ideas_key(ts), "ideas/ideas_20250506_142501.md");

        assert_eq!(timestamp_of("filtered/filtered_20250506_142501.json"), Some(ts));
        assert_eq!(timestamp_of("ideas/ideas_20250506_142501.md"), Some(ts));
        assert_eq!(timestamp_of("raw/latest.json"), None);

        assert_eq!(derived_timestamp("raw/raw_20250506_142501.json", "x"), ts);
        assert_eq!(derived_timestamp("raw/other.json", "20990101_000000"), "20990101_000000");
    }

    #[tokio::test]
    async fn test_write_and_read_latest_articles() {
        let mem = Arc::new(MemoryBlobStore::default());
        let stages = stage_store(&mem);

        let first = vec![article("AI", "https://a", "A")];
        let second = vec![article("AI", "https://b", "B"), article("data", "https://c", "C")];
        stages.write_raw("20250505_100000", &first).await.unwrap();
        let key = stages.write_raw("20250506_100000", &second).await.unwrap();

        let (latest_key, articles) = stages.latest_raw().await.unwrap();
        assert_eq!(latest_key, key);
        assert_eq!(articles, second);

        let stored = mem.blob(&key).unwrap();
        assert_eq!(stored.content_type, "application/json");
    }

    #[tokio::test]
    async fn test_latest_tie_goes_to_greater_key() {
        let mem = Arc::new(MemoryBlobStore::default());
        let at = Utc.with_ymd_and_hms(2025, 5, 6, 10, 0, 0).unwrap();
        mem.insert_at("raw/raw_20250506_100000.json", "[]", at);
        mem.insert_at("raw/raw_20250506_100001.json", "[]", at);
        mem.insert_at("raw/raw_20250401_100000.json", "[]", at - chrono::Duration::days(30));

        let latest: BlobMeta = mem.latest("raw/").await.unwrap();
        assert_eq!(latest.key, "raw/raw_20250506_100001.json");
    }

    #[tokio::test]
    async fn test_ideas_written_as_markdown() {
        let mem = Arc::new(MemoryBlobStore::default());
        let stages = stage_store(&mem);
        let key = stages.write_ideas("20250506_100000", "# Ideas\n").await.unwrap();
        let blob = mem.blob(&key).unwrap();
        assert_eq!(blob.content_type, "text/markdown");
        assert_eq!(blob.content, "# Ideas\n");
    }

    #[tokio::test]
    async fn test_latest_filtered_rejects_non_article_blob() {
        let mem = Arc::new(MemoryBlobStore::default());
        mem.insert_at("filtered/filtered_20250506_100000.json", "{\"oops\":1}", Utc::now());
        let err = stage_store(&mem).latest_filtered().await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
    }

    #[tokio::test]
    async fn test_latest_on_empty_store_fails() {
        let mem = Arc::new(MemoryBlobStore::default());
        assert!(stage_store(&mem).latest_raw().await.is_err());
    }
}
