//! LLM-backed intent classification.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use ciceron_core::{CiceronError, IntentClassifier, IntentLabel, Result};

use crate::client::{ChatClient, ChatMessage};
use crate::prompts;

const CLASSIFY_MAX_TOKENS: u32 = 10;

/// Asks the model for one label out of a fixed vocabulary.
///
/// Anything outside the vocabulary is a malformed-output error, which the
/// router maps to the unspecified label.
pub struct LlmIntentClassifier {
    client: Arc<ChatClient>,
    model: String,
}

impl LlmIntentClassifier {
    pub fn new(client: Arc<ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

/// Parse a model answer such as `"Spain."` or `` `japan/food` ``.
fn parse_label(answer: &str) -> Result<IntentLabel> {
    let cleaned = answer
        .trim()
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '.')
        .trim();
    cleaned
        .parse::<IntentLabel>()
        .map_err(|_| CiceronError::malformed(format!("not a label: {:?}", answer)))
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, query: &str) -> Result<IntentLabel> {
        let messages = [
            ChatMessage::system(prompts::CLASSIFY_SYSTEM),
            ChatMessage::user(prompts::classify_user(query)),
        ];
        let answer = self
            .client
            .complete(&self.model, &messages, 0.0, CLASSIFY_MAX_TOKENS)
            .await?;
        let label = parse_label(&answer)?;
        debug!(%label, "intent classified");
        Ok(label)
    }
}
