//! ciceron-llm - Chat-model backends
//!
//! One HTTP client for any OpenAI-compatible `/chat/completions` endpoint
//! (OpenAI, Groq, Ollama, vLLM, ...) and the three capabilities built on it:
//! query rewriting, intent classification and grounded answer generation.

mod classifier;
mod client;
mod generator;
mod prompts;
mod rewriter;

pub use classifier::LlmIntentClassifier;
pub use client::{ChatClient, ChatMessage};
pub use generator::LlmGenerator;
pub use rewriter::LlmRewriter;
