//! Grounded answer generation.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use ciceron_core::{Generator, LlmConfig, Result, Turn};

use crate::client::{ChatClient, ChatMessage};
use crate::prompts;

/// Answers from the grounding context with the tour-guide system prompt.
pub struct LlmGenerator {
    client: Arc<ChatClient>,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmGenerator {
    pub fn new(
        client: Arc<ChatClient>,
        model: impl Into<String>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
            max_tokens,
        }
    }

    pub fn from_config(client: Arc<ChatClient>, config: &LlmConfig) -> Self {
        Self::new(
            client,
            config.model.clone(),
            config.temperature,
            config.max_answer_tokens,
        )
    }

    /// System prompt, prior turns, then the question with its context.
    fn messages(context: &str, query: &str, history: &[Turn]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(prompts::ANSWER_SYSTEM));
        messages.extend(history.iter().map(ChatMessage::from));
        messages.push(ChatMessage::user(prompts::answer_user(query, context)));
        messages
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, context: &str, query: &str, history: &[Turn]) -> Result<String> {
        let messages = Self::messages(context, query, history);
        let answer = self
            .client
            .complete(&self.model, &messages, self.temperature, self.max_tokens)
            .await?;
        debug!(chars = answer.len(), "answer generated");
        Ok(answer)
    }
}
