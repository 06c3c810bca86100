//! LLM relevance scoring.
//!
//! Articles are sent to the model in fixed-size batches, one prompt per batch,
//! at temperature 0 in JSON mode. The model answers with
//! `{"items": [{"url": ..., "score": ...}]}`; scores are matched back by URL,
//! so the model may reorder items freely.
//!
//! Scoring fails closed: an article whose URL is missing from the response,
//! or whose batch response cannot be parsed, scores 0.

use crate::api::{ChatMessage, ChatModel, ChatRequest};
use crate::error::Result;
use crate::models::Article;
use crate::utils::{looks_truncated, truncate_for_log};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub const DEFAULT_BATCH_SIZE: usize = 20;

/// System prompt carrying the relevance rubric and the response contract.
pub const RELEVANCE_RUBRIC: &str = r#"You are a professional content curator for LinkedIn.
Audience: data scientists, data engineers, AI builders and engineers.

An article is HIGHLY relevant if it covers:
  - real-world data pipelines, lakehouse, MLOps, orchestration
  - deploying or productizing GenAI or LLMs
  - career advice or mindset shifts between DS, DE and AI
NOT relevant: generic business news, advertisement, consumer gadgets, crypto, politics.

TASK
For each article you receive, output an object with:
  - "url": exactly the URL you were given
  - "score": a floating-point relevance from 0 (low) to 1 (high)

ONLY respond with JSON in this form:
{
  "items": [
    {"url": "...", "score": 0.83}
  ]
}"#;

/// Scores returned for one batch, keyed by URL.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScoredBatch {
    scores: HashMap<String, f64>,
}

impl ScoredBatch {
    /// Parse a model response leniently.
    ///
    /// Accepts `{"items": [...]}` or a bare array. Scores given as numeric
    /// strings are accepted; anything else scores 0. Values are clamped to
    /// `[0, 1]`. An unparseable response yields an empty batch.
    pub fn parse(text: &str) -> Self {
        let value: Value = match serde_json::from_str(text.trim()) {
            Ok(v) => v,
            Err(e) => {
                warn!(
                    error = %e,
                    truncated = looks_truncated(&e),
                    response_preview = %truncate_for_log(text, 300),
                    "Model returned non-JSON scores; batch scores 0"
                );
                return Self::default();
            }
        };

        let items = match &value {
            Value::Array(items) => items.as_slice(),
            other => other
                .get("items")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default(),
        };

        let scores = items
            .iter()
            .filter_map(|item| {
                let url = item.get("url")?.as_str()?;
                Some((url.to_string(), score_value(item.get("score"))))
            })
            .collect();
        Self { scores }
    }

    /// Score for `url`, or 0 when the model did not return one.
    pub fn score_for(&self, url: &str) -> f64 {
        self.scores.get(url).copied().unwrap_or(0.0)
    }

    pub fn contains(&self, url: &str) -> bool {
        self.scores.contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

fn score_value(raw: Option<&Value>) -> f64 {
    let score = match raw {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    };
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// User prompt for one batch: URL, title and description per article.
pub fn build_batch_prompt(batch: &[Article]) -> String {
    let mut prompt = String::new();
    for (i, a) in batch.iter().enumerate() {
        if i > 0 {
            prompt.push('\n');
        }
        let _ = writeln!(prompt, "- URL: {}", a.url);
        let _ = writeln!(prompt, "TITLE: {}", a.title);
        let _ = writeln!(prompt, "DESC: {}", a.description);
    }
    prompt
}

/// Keep articles whose score is at least `threshold`. Unscored articles count
/// as 0.
pub fn keep_relevant(articles: Vec<Article>, threshold: f64) -> Vec<Article> {
    articles
        .into_iter()
        .filter(|a| a.score.unwrap_or(0.0) >= threshold)
        .collect()
}

/// Batched LLM relevance scorer with a keep threshold.
pub struct RelevanceScorer {
    llm: Arc<dyn ChatModel>,
    batch_size: usize,
    threshold: f64,
}

impl RelevanceScorer {
    /// Create a scorer with the default batch size.
    ///
    /// # Arguments
    ///
    /// * `llm` - Chat model used for every batch
    /// * `threshold` - Minimum score an article needs to survive [`filter`](Self::filter)
    pub fn new(llm: Arc<dyn ChatModel>, threshold: f64) -> Self {
        Self {
            llm,
            batch_size: DEFAULT_BATCH_SIZE,
            threshold,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Score and keep only articles at or above the threshold.
    pub async fn filter(&self, articles: Vec<Article>) -> Result<Vec<Article>> {
        let total = articles.len();
        let kept = keep_relevant(self.score(articles).await?, self.threshold);
        info!(
            total,
            kept = kept.len(),
            threshold = self.threshold,
            "Filtered articles by relevance"
        );
        Ok(kept)
    }

    /// Attach a score to every article, preserving input order.
    #[instrument(
        level = "info",
        skip_all,
        fields(count = articles.len(), batch_size = self.batch_size)
    )]
    pub async fn score(&self, articles: Vec<Article>) -> Result<Vec<Article>> {
        let mut scored = Vec::with_capacity(articles.len());
        for (i, batch) in articles.chunks(self.batch_size).enumerate() {
            let batch_scores = self.score_batch(batch).await?;
            let missing = batch.iter().filter(|a| !batch_scores.contains(&a.url)).count();
            if batch_scores.is_empty() {
                let size = batch.len();
                warn!(batch = i, size, "No usable scores in response; batch scores 0");
            } else if missing > 0 {
                warn!(batch = i, missing, "Model omitted articles; they score 0");
            }
            debug!(
                batch = i,
                size = batch.len(),
                returned = batch_scores.len(),
                "Scored batch"
            );

            scored.extend(batch.iter().map(|a| Article {
                score: Some(batch_scores.score_for(&a.url)),
                ..a.clone()
            }));
        }
        Ok(scored)
    }

    async fn score_batch(&self, batch: &[Article]) -> Result<ScoredBatch> {
        let request = ChatRequest {
            messages: vec![
                ChatMessage::system(RELEVANCE_RUBRIC),
                ChatMessage::user(build_batch_prompt(batch)),
            ],
            temperature: 0.0,
            json_mode: true,
        };
        let response = self.llm.complete(&request).await?;
        Ok(ScoredBatch::parse(&response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeChat, article, urls_in_prompt, user_content};

    fn articles(n: usize) -> Vec<Article> {
        (0..n)
            .map(|i| article("AI", &format!("https://example.com/{i}"), &format!("Title {i}")))
            .collect()
    }

    #[tokio::test]
    async fn test_threshold_filters_low_scores() {
        let chat = Arc::new(FakeChat::replying(
            r#"{"items":[{"url":"a","score":0.9},{"url":"b","score":0.2}]}"#,
        ));
        let scorer = RelevanceScorer::new(chat.clone(), 0.5);

        let kept = scorer
            .filter(vec![article("AI", "a", "X"), article("AI", "b", "Y")])
            .await
            .unwrap();

        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "a");
        assert_eq!(kept[0].score, Some(0.9));
        assert_eq!(chat.calls(), 1);
    }

    #[tokio::test]
    async fn test_omitted_url_scores_zero() {
        let chat = Arc::new(FakeChat::replying(r#"{"items":[{"url":"a","score":0.7}]}"#));
        let scorer = RelevanceScorer::new(chat, 0.1);

        let scored = scorer
            .score(vec![article("AI", "a", "X"), article("AI", "b", "Y")])
            .await
            .unwrap();
        assert_eq!(scored[1].url, "b");
        assert_eq!(scored[1].score, Some(0.0));

        let kept = keep_relevant(scored, 0.1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].url, "a");
    }

    #[tokio::test]
    async fn test_unparseable_response_fails_closed() {
        let chat = Arc::new(FakeChat::replying(r#"{"items": [{"url": "a", "sco"#));
        let scorer = RelevanceScorer::new(chat, 0.01);

        let kept = scorer.filter(vec![article("AI", "a", "X")]).await.unwrap();
        assert!(kept.is_empty());
    }

    #[tokio::test]
    async fn test_batches_of_twenty_preserve_order() {
        let chat = Arc::new(FakeChat::scoring_all(0.8));
        let scorer = RelevanceScorer::new(chat.clone(), 0.0);
        let input = articles(45);

        let scored = scorer.score(input.clone()).await.unwrap();

        let sizes: Vec<usize> = chat
            .requests()
            .iter()
            .map(|r| urls_in_prompt(&user_content(r)).len())
            .collect();
        assert_eq!(sizes, vec![20, 20, 5]);

        assert_eq!(scored.len(), 45);
        let in_urls: Vec<_> = input.iter().map(|a| &a.url).collect();
        let out_urls: Vec<_> = scored.iter().map(|a| &a.url).collect();
        assert_eq!(in_urls, out_urls);
        assert!(scored.iter().all(|a| a.score == Some(0.8)));
    }

    #[tokio::test]
    async fn test_requests_are_deterministic_json_mode() {
        let chat = Arc::new(FakeChat::scoring_all(0.5));
        let scorer = RelevanceScorer::new(chat.clone(), 0.0).with_batch_size(2);
        scorer.score(articles(3)).await.unwrap();

        let requests = chat.requests();
        assert_eq!(requests.len(), 2);
        for r in &requests {
            assert_eq!(r.temperature, 0.0);
            assert!(r.json_mode);
            assert_eq!(r.messages[0].content, RELEVANCE_RUBRIC);
        }
        let prompt = user_content(&requests[0]);
        assert!(prompt.contains("TITLE: Title 0"));
        assert!(prompt.contains("DESC: about Title 1"));
    }

    #[tokio::test]
    async fn test_reordered_response_matches_by_url() {
        let chat = Arc::new(FakeChat::replying(
            r#"{"items":[{"url":"b","score":0.3},{"url":"a","score":0.6}]}"#,
        ));
        let scorer = RelevanceScorer::new(chat, 0.0);
        let scored = scorer
            .score(vec![article("AI", "a", "X"), article("AI", "b", "Y")])
            .await
            .unwrap();
        assert_eq!(scored[0].score, Some(0.6));
        assert_eq!(scored[1].score, Some(0.3));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let chat = Arc::new(FakeChat::scoring_all(1.0));
        let scorer = RelevanceScorer::new(chat.clone(), 0.5);
        assert!(scorer.filter(Vec::new()).await.unwrap().is_empty());
        assert_eq!(chat.calls(), 0);
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let chat = Arc::new(FakeChat::new(|_| {
            Err(crate::error::PipelineError::Llm("down".to_string()))
        }));
        let scorer = RelevanceScorer::new(chat, 0.5);
        assert!(scorer.filter(vec![article("AI", "a", "X")]).await.is_err());
    }

    #[test]
    fn test_parse_is_lenient() {
        let batch = ScoredBatch::parse(
            r#"[
                {"url":"a","score":"0.4"},
                {"url":"b","score":7},
                {"url":"c","score":-1},
                {"url":"d"},
                {"score":0.9}
            ]"#,
        );
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.score_for("a"), 0.4);
        assert_eq!(batch.score_for("b"), 1.0);
        assert_eq!(batch.score_for("c"), 0.0);
        assert_eq!(batch.score_for("d"), 0.0);
        assert_eq!(batch.score_for("zzz"), 0.0);

        assert!(ScoredBatch::parse(r#"{"results": []}"#).is_empty());
        assert!(ScoredBatch::parse("I think they're all great").is_empty());
    }

    #[test]
    fn test_batch_prompt_lists_every_article() {
        let prompt = build_batch_prompt(&[article("AI", "a", "X"), article("AI", "b", "Y")]);
        assert_eq!(urls_in_prompt(&prompt), vec!["a".to_string(), "b".to_string()]);
        assert!(prompt.contains("TITLE: X\nDESC: about X"));
    }
}
