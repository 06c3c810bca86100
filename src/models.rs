//! Data models shared by every pipeline stage.
//!
//! - [`RawArticle`] / [`SearchResponse`]: the article-search API wire shape
//! - [`Article`]: a normalized, topic-tagged article (optionally scored)
//! - [`TopicQuery`]: one per-topic search request
//!
//! [`Article`] serializes `published_at` as `publishedAt` so stored stage
//! artifacts keep the same field names the search API uses.

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

/// A normalized article tagged with the topic that surfaced it.
///
/// Identity is the `url`: two articles with the same URL are the same entity
/// regardless of which topic found them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    /// The configured topic whose search returned this article first.
    pub topic: String,
    pub title: String,
    pub description: String,
    /// Canonical identifier.
    pub url: String,
    #[serde(rename = "publishedAt", default)]
    pub published_at: String,
    /// Relevance in `[0, 1]`, set by the scorer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

/// One item of the search API's `articles` array. Every field may be null or
/// missing upstream.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawArticle {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "publishedAt", default)]
    pub published_at: Option<String>,
}

impl RawArticle {
    /// Normalize into an [`Article`] tagged with `topic`.
    ///
    /// Returns `None` when the record has no usable URL, since such a record
    /// cannot be deduplicated or scored.
    pub fn into_article(self, topic: &str) -> Option<Article> {
        let url = self.url.filter(|u| !u.trim().is_empty())?;
        Some(Article {
            topic: topic.to_string(),
            title: self.title.unwrap_or_default(),
            description: self.description.unwrap_or_default(),
            url,
            published_at: self.published_at.unwrap_or_default(),
            score: None,
        })
    }
}

/// Response body of the article-search endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub articles: Vec<RawArticle>,
}

/// A single per-topic search request over an inclusive date window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicQuery {
    pub topic: String,
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub page_size: u32,
}

impl TopicQuery {
    /// Build the query covering `today - days_back ..= today`.
    pub fn for_window(topic: &str, today: NaiveDate, days_back: u32, page_size: u32) -> Self {
        let date_from = today
            .checked_sub_days(Days::new(u64::from(days_back)))
            .unwrap_or(NaiveDate::MIN);
        Self {
            topic: topic.to_string(),
            date_from,
            date_to: today,
            page_size,
        }
    }
}
