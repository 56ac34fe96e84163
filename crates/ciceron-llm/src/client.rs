//! OpenAI-compatible chat-completions client.

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use ciceron_core::{CiceronError, LlmConfig, Result, Turn};

/// One message of a chat request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    fn from(turn: &Turn) -> Self {
        Self {
            role: turn.role.as_str().to_string(),
            content: turn.text.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// HTTP client for `{base_url}/chat/completions`.
#[derive(Debug, Clone)]
pub struct ChatClient {
    /// Base URL including the API version, e.g. "http://localhost:11434/v1"
    base_url: String,

    /// Bearer token, when the endpoint needs one
    api_key: Option<String>,

    /// HTTP client with connection pooling
    client: Client,
}

impl ChatClient {
    /// Create a new chat client.
    ///
    /// `timeout` bounds each HTTP request; callers add their own stage
    /// timeouts on top.
    #[instrument(skip_all, fields(base_url = %base_url))]
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| CiceronError::llm(format!("Failed to build HTTP client: {}", e)))?;

        info!(
            "Initialized chat client: base_url={}, timeout={}ms, authenticated={}",
            base_url,
            timeout.as_millis(),
            api_key.is_some()
        );

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    /// Create a client from the `[llm]` configuration section.
    pub fn from_config(config: &LlmConfig, timeout: Duration) -> Result<Self> {
        Self::new(&config.base_url, config.api_key(), timeout)
    }

    /// Run one chat completion and return the first choice's text.
    #[instrument(skip(self, messages), fields(messages = messages.len()))]
    pub async fn complete(
        &self,
        model: &str,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = CompletionRequest {
            model,
            messages,
            temperature,
            max_tokens,
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CiceronError::llm(format!("Request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(CiceronError::llm(format!(
                "Endpoint returned status {}: {}",
                status, error_text
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| CiceronError::malformed(format!("Invalid completion JSON: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CiceronError::malformed("Completion has no message content"))?;

        debug!(chars = content.len(), "completion received");
        Ok(content)
    }
}
