//! LLM-backed query rewriting.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use ciceron_core::{QueryRewriter, Result, Turn};

use crate::client::{ChatClient, ChatMessage};
use crate::prompts;

const REWRITE_MAX_TOKENS: u32 = 100;

/// Rewrites follow-up questions into standalone search queries.
///
/// Returns the model's raw answer; cleanup and the degenerate-output
/// fallback belong to the rewrite stage.
pub struct LlmRewriter {
    client: Arc<ChatClient>,
    model: String,
}

impl LlmRewriter {
    pub fn new(client: Arc<ChatClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl QueryRewriter for LlmRewriter {
    async fn rewrite(&self, query: &str, history: &[Turn]) -> Result<String> {
        let messages = [
            ChatMessage::system(prompts::REWRITE_SYSTEM),
            ChatMessage::user(prompts::rewrite_user(query, history)),
        ];
        let rewritten = self
            .client
            .complete(&self.model, &messages, 0.0, REWRITE_MAX_TOKENS)
            .await?;
        debug!(original = query, rewritten = %rewritten, "query rewritten");
        Ok(rewritten)
    }
}
