//! Runtime settings.
//!
//! Settings resolve in three layers: built-in defaults, an optional YAML file,
//! then environment variables (a local `.env` is loaded by `main` first).
//! Missing credentials are a startup failure.

use crate::error::{PipelineError, Result};
use itertools::Itertools;
use serde::Deserialize;
use std::str::FromStr;
use tracing::{debug, info, instrument};

pub const DEFAULT_TOPICS: &str = "AI,technology,data,health,productivity,self-improvement";
pub const DEFAULT_NEWS_API_URL: &str = "https://newsapi.org/v2/everything";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub news_api_key: String,
    pub openai_api_key: String,
    /// GCS bucket for stage artifacts; only the HTTP trigger requires it.
    pub bucket_name: Option<String>,
    pub topics: Vec<String>,
    pub page_size: u32,
    pub days_back: u32,
    /// Minimum relevance score kept by the scorer.
    pub threshold: f64,
    pub batch_size: usize,
    pub model: String,
    pub news_api_url: String,
    pub openai_base_url: String,
    /// Timeout for LLM calls, in seconds.
    pub llm_timeout_secs: u64,
    pub raw_prefix: String,
    pub filtered_prefix: String,
    pub ideas_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            news_api_key: String::new(),
            openai_api_key: String::new(),
            bucket_name: None,
            topics: parse_topics(DEFAULT_TOPICS),
            page_size: 30,
            days_back: 7,
            threshold: 0.0,
            batch_size: 20,
            model: DEFAULT_MODEL.to_string(),
            news_api_url: DEFAULT_NEWS_API_URL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            llm_timeout_secs: 120,
            raw_prefix: "raw/".to_string(),
            filtered_prefix: "filtered/".to_string(),
            ideas_prefix: "ideas/".to_string(),
        }
    }
}

impl Settings {
    /// Load defaults, overlay `path` (YAML) if given, then the process
    /// environment, and validate the result.
    #[instrument(level = "info")]
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut settings = match path {
            Some(p) => {
                let text = std::fs::read_to_string(p)?;
                info!(path = p, "Loaded settings file");
                Self::from_yaml(&text)?
            }
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        debug!(
            topics = ?settings.topics,
            page_size = settings.page_size,
            days_back = settings.days_back,
            threshold = settings.threshold,
            batch_size = settings.batch_size,
            "Resolved settings"
        );
        Ok(settings)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        let mut settings: Settings = serde_yaml::from_str(text)?;
        settings.topics = normalize_topics(settings.topics);
        Ok(settings)
    }

    /// Overlay values found through `lookup`. Blank values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("NEWS_API_KEY") {
            self.news_api_key = v;
        }
        if let Some(v) = get("OPENAI_API_KEY") {
            self.openai_api_key = v;
        }
        if let Some(v) = get("BUCKET_NAME") {
            self.bucket_name = Some(v);
        }
        if let Some(v) = get("TOPICS") {
            self.topics = parse_topics(&v);
        }
        if let Some(v) = get("PAGE_SIZE") {
            self.page_size = parse_env("PAGE_SIZE", &v)?;
        }
        if let Some(v) = get("DAYS_BACK") {
            self.days_back = parse_env("DAYS_BACK", &v)?;
        }
        if let Some(v) = get("RELEVANCE_THRESHOLD") {
            self.threshold = parse_env("RELEVANCE_THRESHOLD", &v)?;
        }
        if let Some(v) = get("BATCH_SIZE") {
            self.batch_size = parse_env("BATCH_SIZE", &v)?;
        }
        if let Some(v) = get("LLM_TIMEOUT_SECS") {
            self.llm_timeout_secs = parse_env("LLM_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.model = v;
        }
        if let Some(v) = get("OPENAI_BASE_URL") {
            self.openai_base_url = v;
        }
        if let Some(v) = get("NEWS_API_URL") {
            self.news_api_url = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.news_api_key.trim().is_empty() {
            return Err(PipelineError::Config("NEWS_API_KEY is not set".to_string()));
        }
        if self.openai_api_key.trim().is_empty() {
            return Err(PipelineError::Config("OPENAI_API_KEY is not set".to_string()));
        }
        if self.topics.is_empty() {
            return Err(PipelineError::Config("at least one topic is required".to_string()));
        }
        if self.page_size == 0 {
            return Err(PipelineError::Config("page_size must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Config("batch_size must be at least 1".to_string()));
        }
        if self.llm_timeout_secs == 0 {
            return Err(PipelineError::Config("llm_timeout_secs must be at least 1".to_string()));
        }
        check_threshold(self.threshold)
    }
}

/// Reject thresholds outside `[0, 1]` (including NaN).
pub fn check_threshold(threshold: f64) -> Result<()> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(PipelineError::Config(format!(
            "threshold must be within [0, 1], got {threshold}"
        )))
    }
}

/// Split a comma-separated topic list, trimming blanks and repeats.
pub fn parse_topics(raw: &str) -> Vec<String> {
    normalize_topics(raw.split(',').map(str::to_string).collect())
}

fn normalize_topics(topics: Vec<String>) -> Vec<String> {
    topics
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unique()
        .collect()
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| PipelineError::Config(format!("{key} has an invalid value: {value:?}")))
}
