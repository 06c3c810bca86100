//! Markdown digest of post ideas.
//!
//! Articles are grouped by topic in order of first appearance and rendered
//! into a single prompt; the model's answer is returned as-is apart from
//! trimming. The markdown structure of the answer is not validated.

use crate::api::{ChatMessage, ChatModel, ChatRequest};
use crate::error::Result;
use crate::models::Article;
use std::sync::Arc;
use tracing::{info, instrument};

pub const DIGEST_TEMPERATURE: f64 = 0.7;

/// Prompt header for the digest request.
pub const DIGEST_BRIEF: &str = "You are a LinkedIn content strategist.
Persona: data scientist pivoting into data engineering and AI.

For EACH topic, craft THREE post ideas:
 - start with a spicy HOOK
 - add 1-2 TAKEAWAYS
 - end with a CTA
Write as Markdown bullet points.
Here are the articles:
";

/// Articles grouped by topic, topics in first-appearance order.
pub fn group_by_topic(articles: &[Article]) -> Vec<(&str, Vec<&Article>)> {
    let mut groups: Vec<(&str, Vec<&Article>)> = Vec::new();
    for a in articles {
        match groups.iter_mut().find(|(topic, _)| *topic == a.topic) {
            Some((_, items)) => items.push(a),
            None => groups.push((a.topic.as_str(), vec![a])),
        }
    }
    groups
}

/// Render the digest prompt.
///
/// # Arguments
///
/// * `articles` - Articles to include; grouped into one `## <topic>` section
///   per topic, each listed as `- title: description`
///
/// # Returns
///
/// [`DIGEST_BRIEF`] followed by the topic sections.
pub fn build_digest_prompt(articles: &[Article]) -> String {
    let mut parts = vec![DIGEST_BRIEF.to_string()];
    for (topic, items) in group_by_topic(articles) {
        parts.push(format!("\n## {topic}\n"));
        parts.extend(items.iter().map(|a| format!("- {}: {}", a.title, a.description)));
    }
    parts.join("\n")
}

/// Turns a set of articles into a markdown digest of post ideas.
pub struct DigestComposer {
    llm: Arc<dyn ChatModel>,
}

impl DigestComposer {
    pub fn new(llm: Arc<dyn ChatModel>) -> Self {
        Self { llm }
    }

    /// Draft the digest. No articles means an empty digest and no model call.
    #[instrument(level = "info", skip_all, fields(count = articles.len()))]
    pub async fn compose(&self, articles: &[Article]) -> Result<String> {
        if articles.is_empty() {
            info!("No articles to summarize; digest is empty");
            return Ok(String::new());
        }
        let request = ChatRequest {
            messages: vec![ChatMessage::user(build_digest_prompt(articles))],
            temperature: DIGEST_TEMPERATURE,
            json_mode: false,
        };
        let text = self.llm.complete(&request).await?;
        let digest = text.trim().to_string();
        info!(bytes = digest.len(), "Composed digest");
        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeChat, article, user_content};

    #[test]
    fn test_group_by_topic_keeps_first_appearance_order() {
        let articles = vec![
            article("health", "1", "Sleep"),
            article("AI", "2", "Agents"),
            article("health", "3", "Food"),
        ];
        let groups = group_by_topic(&articles);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0, "health");
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].0, "AI");
    }

    #[test]
    fn test_prompt_sections() {
        let articles = vec![article("AI", "1", "Agents"), article("data", "2", "Lakehouse")];
        let prompt = build_digest_prompt(&articles);
        assert!(prompt.starts_with("You are a LinkedIn content strategist."));
        assert!(prompt.contains("\n## AI\n"));
        assert!(prompt.contains("- Agents: about Agents"));
        assert!(prompt.find("## AI").unwrap() < prompt.find("## data").unwrap());
    }

    #[tokio::test]
    async fn test_compose_trims_and_uses_exploratory_temperature() {
        let chat = Arc::new(FakeChat::replying("\n\n## AI\n- idea\n  "));
        let composer = DigestComposer::new(chat.clone());

        let digest = composer.compose(&[article("AI", "1", "Agents")]).await.unwrap();
        assert_eq!(digest, "## AI\n- idea");

        let requests = chat.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].temperature, DIGEST_TEMPERATURE);
        assert!(!requests[0].json_mode);
        assert!(user_content(&requests[0]).contains("## AI"));
    }

    #[tokio::test]
    async fn test_compose_passes_malformed_output_through() {
        let chat = Arc::new(FakeChat::replying("not markdown at all"));
        let digest = DigestComposer::new(chat)
            .compose(&[article("AI", "1", "Agents")])
            .await
            .unwrap();
        assert_eq!(digest, "not markdown at all");
    }

    #[tokio::test]
    async fn test_empty_input_skips_model() {
        let chat = Arc::new(FakeChat::replying("unused"));
        let composer = DigestComposer::new(chat.clone());
        assert_eq!(composer.compose(&[]).await.unwrap(), "");
        assert_eq!(chat.calls(), 0);
    }
}
