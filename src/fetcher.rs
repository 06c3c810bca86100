//! Topic fan-out and merge-dedupe.
//!
//! One search per configured topic runs concurrently (at most
//! [`MAX_WORKERS`] in flight). Per-topic results are collected in completion
//! order at a single point and reduced by [`merge_dedupe`]; the search tasks
//! never touch shared state.
//!
//! # Failure handling
//!
//! A topic whose search fails (timeout, HTTP error, malformed body) is logged
//! and contributes no articles. A run where every topic fails yields an empty
//! list.

use crate::models::{Article, RawArticle, TopicQuery};
use crate::sources::SearchApi;
use chrono::{Local, NaiveDate};
use futures::stream::{self, StreamExt};
use itertools::Itertools;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};

/// Upper bound on concurrent topic searches.
pub const MAX_WORKERS: usize = 6;

/// Raw records returned for one topic.
#[derive(Debug, Clone)]
pub struct TopicResult {
    pub topic: String,
    pub articles: Vec<RawArticle>,
}

/// Fans one search out per topic and merges the results.
pub struct TopicFetcher {
    source: Arc<dyn SearchApi>,
    topics: Vec<String>,
    page_size: u32,
}

impl TopicFetcher {
    /// Create a fetcher.
    ///
    /// # Arguments
    ///
    /// * `source` - Search client shared by every topic task
    /// * `topics` - Topics to query, one search each
    /// * `page_size` - Maximum articles requested per topic
    pub fn new(source: Arc<dyn SearchApi>, topics: Vec<String>, page_size: u32) -> Self {
        Self {
            source,
            topics,
            page_size,
        }
    }

    /// Fetch the window ending on today's local date.
    pub async fn fetch_last_days(&self, days_back: u32) -> Vec<Article> {
        self.fetch_window(Local::now().date_naive(), days_back).await
    }

    /// Fetch every topic for `today - days_back ..= today` and merge the
    /// results into a URL-unique article list.
    ///
    /// # Returns
    ///
    /// The merged articles. Failed topics contribute nothing, so this never
    /// fails; with every topic failing the list is empty.
    #[instrument(level = "info", skip(self), fields(topics = self.topics.len()))]
    pub async fn fetch_window(&self, today: NaiveDate, days_back: u32) -> Vec<Article> {
        if self.topics.is_empty() {
            return Vec::new();
        }
        let t0 = Instant::now();
        let workers = MAX_WORKERS.min(self.topics.len());

        let queries: Vec<TopicQuery> = self
            .topics
            .iter()
            .map(|topic| TopicQuery::for_window(topic, today, days_back, self.page_size))
            .collect();

        let shared = Arc::clone(&self.source);
        let completed: Vec<TopicResult> = stream::iter(queries)
            .map(move |query| {
                let source = Arc::clone(&shared);
                async move {
                    match source.search(&query).await {
                        Ok(articles) => {
                            info!(topic = %query.topic, count = articles.len(), "Fetched topic");
                            TopicResult {
                                topic: query.topic,
                                articles,
                            }
                        }
                        Err(e) => {
                            error!(
                                topic = %query.topic,
                                error = %e,
                                "Search failed; topic contributes no articles"
                            );
                            TopicResult {
                                topic: query.topic,
                                articles: Vec::new(),
                            }
                        }
                    }
                }
            })
            .buffer_unordered(workers)
            .collect()
            .await;

        let merged = merge_dedupe(completed);
        info!(
            count = merged.len(),
            workers,
            elapsed_ms = t0.elapsed().as_millis(),
            "Fetched unique articles"
        );
        merged
    }
}

/// Merge per-topic results into one list with unique URLs.
///
/// Results are consumed in the given order; the first record seen for a URL
/// wins, including its topic attribution. Records without a URL are dropped
/// and missing text fields become empty strings.
pub fn merge_dedupe<I>(results: I) -> Vec<Article>
where
    I: IntoIterator<Item = TopicResult>,
{
    results
        .into_iter()
        .flat_map(|result| {
            let topic = result.topic;
            result
                .articles
                .into_iter()
                .filter_map(move |raw| raw.into_article(&topic))
        })
        .unique_by(|a| a.url.clone())
        .collect()
}
