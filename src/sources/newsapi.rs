//! NewsAPI (`/v2/everything`) search client.
//!
//! Each topic query asks for English articles in the window, sorted by
//! popularity and capped at the page size. Every request carries a fixed
//! timeout so one slow topic cannot stall the run.

use super::SearchApi;
use crate::error::{PipelineError, Result};
use crate::models::{RawArticle, SearchResponse, TopicQuery};
use crate::utils::truncate_for_log;
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info, instrument};
use url::Url;

/// Per-request timeout for search calls.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// NewsAPI search client with a per-request timeout.
pub struct NewsApiClient {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl NewsApiClient {
    /// Create a client for `endpoint` using [`SEARCH_TIMEOUT`].
    ///
    /// # Arguments
    ///
    /// * `api_key` - NewsAPI key, sent as the `apiKey` query parameter
    /// * `endpoint` - Full `everything` URL, e.g. `https://newsapi.org/v2/everything`
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>) -> Result<Self> {
        Self::with_timeout(api_key, endpoint, SEARCH_TIMEOUT)
    }

    pub fn with_timeout(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
        })
    }

    fn request_url(&self, query: &TopicQuery) -> Result<Url> {
        let page_size = query.page_size.to_string();
        let from = query.date_from.to_string();
        let to = query.date_to.to_string();
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("q", query.topic.as_str()),
                ("from", from.as_str()),
                ("to", to.as_str()),
                ("language", "en"),
                ("sortBy", "popularity"),
                ("pageSize", page_size.as_str()),
                ("apiKey", self.api_key.as_str()),
            ],
        )
        .map_err(|e| {
            PipelineError::Config(format!("invalid search endpoint {:?}: {e}", self.endpoint))
        })
    }
}

impl std::fmt::Debug for NewsApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewsApiClient")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

#[async_trait]
impl SearchApi for NewsApiClient {
    #[instrument(level = "info", skip_all, fields(topic = %query.topic))]
    async fn search(&self, query: &TopicQuery) -> Result<Vec<RawArticle>> {
        let url = self.request_url(query)?;
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(PipelineError::Upstream(format!(
                "search returned {status}: {}",
                truncate_for_log(&body, 200)
            )));
        }

        let parsed: SearchResponse = serde_json::from_str(&body)?;
        if parsed.status.as_deref() == Some("error") {
            return Err(PipelineError::Upstream(
                parsed.message.unwrap_or_else(|| "search reported an error".to_string()),
            ));
        }

        info!(count = parsed.articles.len(), "Search returned articles");
        debug!(from = %query.date_from, to = %query.date_to, "Search window");
        Ok(parsed.articles)
    }
}
