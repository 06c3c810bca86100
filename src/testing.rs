//! Test doubles for the pipeline's capability traits.
//!
//! - [`FakeSearch`]: scripted per-topic search results, delays and failures
//! - [`FakeChat`]: a chat model driven by a closure that records every request
//! - [`MemoryBlobStore`]: an in-memory [`BlobStore`] with controllable times

use crate::api::{ChatModel, ChatRequest, Role};
use crate::error::{PipelineError, Result};
use crate::models::{Article, RawArticle, TopicQuery};
use crate::sources::SearchApi;
use crate::storage::{BlobMeta, BlobStore};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde_json::json;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

pub fn raw(url: &str, title: &str) -> RawArticle {
    RawArticle {
        title: Some(title.to_string()),
        description: Some(format!("about {title}")),
        url: Some(url.to_string()),
        published_at: Some("2025-05-06T10:00:00Z".to_string()),
    }
}

pub fn article(topic: &str, url: &str, title: &str) -> Article {
    Article {
        topic: topic.to_string(),
        title: title.to_string(),
        description: format!("about {title}"),
        url: url.to_string(),
        published_at: "2025-05-06T10:00:00Z".to_string(),
        score: None,
    }
}

enum Script {
    Articles { articles: Vec<RawArticle>, delay: Duration },
    Fail,
}

#[derive(Default)]
pub struct FakeSearch {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<TopicQuery>>,
}

impl FakeSearch {
    pub fn with_topic(self, topic: &str, articles: Vec<RawArticle>) -> Self {
        self.with_delayed_topic(topic, Duration::ZERO, articles)
    }

    pub fn with_delayed_topic(
        mut self,
        topic: &str,
        delay: Duration,
        articles: Vec<RawArticle>,
    ) -> Self {
        self.scripts
            .insert(topic.to_string(), Script::Articles { articles, delay });
        self
    }

    pub fn with_failing_topic(mut self, topic: &str) -> Self {
        self.scripts.insert(topic.to_string(), Script::Fail);
        self
    }

    pub fn calls(&self) -> Vec<TopicQuery> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchApi for FakeSearch {
    async fn search(&self, query: &TopicQuery) -> Result<Vec<RawArticle>> {
        self.calls.lock().unwrap().push(query.clone());
        match self.scripts.get(&query.topic) {
            None => Ok(Vec::new()),
            Some(Script::Fail) => Err(PipelineError::Upstream("simulated 500".to_string())),
            Some(Script::Articles { articles, delay }) => {
                if !delay.is_zero() {
                    tokio::time::sleep(*delay).await;
                }
                Ok(articles.clone())
            }
        }
    }
}

type Responder = Box<dyn Fn(&ChatRequest) -> Result<String> + Send + Sync>;

pub struct FakeChat {
    responder: Responder,
    requests: Mutex<Vec<ChatRequest>>,
}

impl FakeChat {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest) -> Result<String> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always answers with `text`.
    pub fn replying(text: &str) -> Self {
        let text = text.to_string();
        Self::new(move |_| Ok(text.clone()))
    }

    /// Scores every URL in a scoring prompt with `score`; answers digest
    /// prompts with a fixed markdown body.
    pub fn scoring_all(score: f64) -> Self {
        Self::new(move |req| {
            if req.json_mode {
                let items: Vec<_> = urls_in_prompt(&user_content(req))
                    .into_iter()
                    .map(|url| json!({"url": url, "score": score}))
                    .collect();
                Ok(json!({ "items": items }).to_string())
            } else {
                Ok("\n## AI\n- Hook: pipelines\n".to_string())
            }
        })
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(&self, request: &ChatRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request.clone());
        (self.responder)(request)
    }
}

/// Concatenated user-message content of a request.
pub fn user_content(req: &ChatRequest) -> String {
    req.messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// URLs listed in a scoring prompt, in prompt order.
pub fn urls_in_prompt(prompt: &str) -> Vec<String> {
    prompt
        .lines()
        .filter_map(|l| l.strip_prefix("- URL: "))
        .map(|u| u.trim().to_string())
        .collect()
}

#[derive(Debug, Clone)]
pub struct StoredBlob {
    pub content: String,
    pub content_type: String,
    pub created: DateTime<Utc>,
}

#[derive(Default)]
struct MemoryInner {
    blobs: BTreeMap<String, StoredBlob>,
    last: Option<DateTime<Utc>>,
}

/// In-memory blob store. Each `put` gets a creation time strictly after the
/// previous one so "latest" is unambiguous.
#[derive(Default)]
pub struct MemoryBlobStore {
    inner: Mutex<MemoryInner>,
    fail_writes: bool,
}

impl MemoryBlobStore {
    pub fn failing_writes() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn insert_at(&self, key: &str, content: &str, created: DateTime<Utc>) {
        self.inner.lock().unwrap().blobs.insert(
            key.to_string(),
            StoredBlob {
                content: content.to_string(),
                content_type: "application/json".to_string(),
                created,
            },
        );
    }

    pub fn blob(&self, key: &str) -> Option<StoredBlob> {
        self.inner.lock().unwrap().blobs.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.lock().unwrap().blobs.keys().cloned().collect()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, content: Vec<u8>, content_type: &str) -> Result<()> {
        if self.fail_writes {
            return Err(PipelineError::Storage("simulated write failure".to_string()));
        }
        let mut inner = self.inner.lock().unwrap();
        let now = Utc::now();
        let created = match inner.last {
            Some(last) if now <= last => last + ChronoDuration::milliseconds(1),
            _ => now,
        };
        inner.last = Some(created);
        inner.blobs.insert(
            key.to_string(),
            StoredBlob {
                content: String::from_utf8_lossy(&content).into_owned(),
                content_type: content_type.to_string(),
                created,
            },
        );
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<BlobMeta>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .blobs
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, b)| BlobMeta {
                key: k.clone(),
                created: b.created,
            })
            .collect())
    }

    async fn get_text(&self, key: &str) -> Result<String> {
        self.blob(key)
            .map(|b| b.content)
            .ok_or_else(|| PipelineError::Storage(format!("blob {key:?} not found")))
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
