//! End-to-end pipeline wiring.
//!
//! A [`Pipeline`] is assembled from already-configured clients (search API,
//! chat model, optional blob store) and runs in one of two modes:
//!
//! - [`Pipeline::run_in_memory`]: stages hand data to each other directly;
//!   artifacts are written to the store (if any) under one run timestamp.
//! - [`Pipeline::run_chained`]: each stage reads its input back from the
//!   store (latest blob under the upstream prefix), so stages stay
//!   independent in a stateless deployment. Requires a store.

use crate::api::ChatModel;
use crate::config::Settings;
use crate::digest::DigestComposer;
use crate::error::{PipelineError, Result};
use crate::fetcher::TopicFetcher;
use crate::scorer::RelevanceScorer;
use crate::sources::SearchApi;
use crate::storage::BlobStore;
use crate::storage::stages::{StagePrefixes, StageStore, derived_timestamp};
use crate::utils::run_timestamp;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};

/// Per-invocation options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    pub days_back: u32,
    /// Run the relevance scorer; when false every fetched article is digested.
    pub filter: bool,
}

/// Outcome of a single run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_ts: String,
    pub raw_count: usize,
    pub filtered_count: usize,
    pub digest: String,
    pub raw_key: Option<String>,
    pub filtered_key: Option<String>,
    pub ideas_key: Option<String>,
}

/// The fetch → score → digest pipeline with its injected clients.
///
/// Holds no state between runs; one instance can serve any number of
/// sequential or concurrent invocations.
pub struct Pipeline {
    fetcher: TopicFetcher,
    scorer: RelevanceScorer,
    composer: DigestComposer,
    stages: Option<StageStore>,
    days_back: u32,
}

impl Pipeline {
    /// Assemble a pipeline.
    ///
    /// # Arguments
    ///
    /// * `settings` - Topics, page size, threshold, batch size, lookback and
    ///   stage prefixes
    /// * `search` - Article search client used once per topic
    /// * `llm` - Chat model shared by the scorer and the digest composer
    /// * `store` - Blob store for stage artifacts; `None` keeps everything in
    ///   memory
    pub fn new(
        settings: &Settings,
        search: Arc<dyn SearchApi>,
        llm: Arc<dyn ChatModel>,
        store: Option<Arc<dyn BlobStore>>,
    ) -> Self {
        Self {
            fetcher: TopicFetcher::new(search, settings.topics.clone(), settings.page_size),
            scorer: RelevanceScorer::new(llm.clone(), settings.threshold)
                .with_batch_size(settings.batch_size),
            composer: DigestComposer::new(llm),
            stages: store.map(|s| StageStore::new(s, StagePrefixes::from(settings))),
            days_back: settings.days_back,
        }
    }

    /// Options for a run with the configured lookback and filtering on.
    pub fn default_options(&self) -> RunOptions {
        RunOptions {
            days_back: self.days_back,
            filter: true,
        }
    }

    /// Fetch, optionally filter, and digest, passing data between stages
    /// directly.
    ///
    /// # Returns
    ///
    /// A [`RunReport`] with counts, the digest text, and the artifact keys
    /// written (all `None` without a store).
    ///
    /// # Errors
    ///
    /// LLM transport failures and storage failures abort the run. Failed
    /// topic searches do not.
    #[instrument(level = "info", skip(self))]
    pub async fn run_in_memory(&self, opts: RunOptions) -> Result<RunReport> {
        let t0 = Instant::now();
        let run_ts = run_timestamp();

        let raw = self.fetcher.fetch_last_days(opts.days_back).await;
        let raw_count = raw.len();
        let raw_key = match &self.stages {
            Some(stages) => Some(stages.write_raw(&run_ts, &raw).await?),
            None => None,
        };

        let (articles, filtered_key) = if opts.filter {
            let kept = self.scorer.filter(raw).await?;
            let key = match &self.stages {
                Some(stages) => Some(stages.write_filtered(&run_ts, &kept).await?),
                None => None,
            };
            (kept, key)
        } else {
            (raw, None)
        };
        let filtered_count = articles.len();

        let digest = self.composer.compose(&articles).await?;
        let ideas_key = match &self.stages {
            Some(stages) => Some(stages.write_ideas(&run_ts, &digest).await?),
            None => None,
        };

        info!(
            raw = raw_count,
            filtered = filtered_count,
            elapsed_ms = t0.elapsed().as_millis(),
            "Pipeline complete: raw={}, filtered={}",
            raw_count,
            filtered_count
        );
        Ok(RunReport {
            run_ts,
            raw_count,
            filtered_count,
            digest,
            raw_key,
            filtered_key,
            ideas_key,
        })
    }

    /// Run every stage through the store: fetch and write raw, filter the
    /// latest raw blob, digest the latest filtered blob.
    ///
    /// The filtered and ideas keys take their timestamp from the blob each
    /// stage consumed, so a chained run's artifacts share one suffix.
    ///
    /// # Errors
    ///
    /// [`PipelineError::Config`] when the pipeline has no store; otherwise as
    /// [`Pipeline::run_in_memory`].
    #[instrument(level = "info", skip(self))]
    pub async fn run_chained(&self) -> Result<RunReport> {
        let stages = self.stages.as_ref().ok_or_else(|| {
            PipelineError::Config("chained runs need a blob store (set BUCKET_NAME)".to_string())
        })?;
        let t0 = Instant::now();
        let run_ts = run_timestamp();

        // 1) fetch raw articles
        let raw = self.fetcher.fetch_last_days(self.days_back).await;
        let raw_count = raw.len();
        let raw_key = stages.write_raw(&run_ts, &raw).await?;

        // 2) filter the latest raw set
        let (latest_raw_key, latest_raw) = stages.latest_raw().await?;
        let kept = self.scorer.filter(latest_raw).await?;
        let filtered_ts = derived_timestamp(&latest_raw_key, &run_ts);
        let filtered_key = stages.write_filtered(&filtered_ts, &kept).await?;

        // 3) digest the latest filtered set
        let (latest_filtered_key, latest_filtered) = stages.latest_filtered().await?;
        let digest = self.composer.compose(&latest_filtered).await?;
        let ideas_ts = derived_timestamp(&latest_filtered_key, &filtered_ts);
        let ideas_key = stages.write_ideas(&ideas_ts, &digest).await?;

        info!(
            raw = raw_count,
            filtered = kept.len(),
            location = %stages.location(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Pipeline complete: raw={}, filtered={}",
            raw_count,
            kept.len()
        );
        Ok(RunReport {
            run_ts,
            raw_count,
            filtered_count: kept.len(),
            digest,
            raw_key: Some(raw_key),
            filtered_key: Some(filtered_key),
            ideas_key: Some(ideas_key),
        })
    }
}
