//! ciceron-query - Hybrid retrieval pipeline
//!
//! This crate turns a traveller's question into a grounded answer:
//!
//! - Guardrail against prompt-injection attempts
//! - Query rewriting with conversation history
//! - Intent routing to a country/topic filter
//! - Lexical and vector retrieval with filter relaxation
//! - Reciprocal Rank Fusion and cross-encoder reranking
//! - Image selection for the cited chunks
//! - Conversation memory per session
//!
//! Every stage before generation degrades instead of failing; the markers
//! end up in [`ChatResponse::degraded`](ciceron_core::ChatResponse).
//!
//! # Example
//!
//! ```rust,ignore
//! use ciceron_query::{ConversationMemory, Pipeline, PipelineBackends};
//! use tokio_util::sync::CancellationToken;
//!
//! let pipeline = Pipeline::new(backends, &config);
//! let mut memory = ConversationMemory::new(config.memory.max_turns);
//! let outcome = pipeline
//!     .answer("¿Dónde comer ramen en Tokio?", &mut memory, &CancellationToken::new())
//!     .await;
//! ```

mod budget;
mod fusion;
mod guardrail;
mod ladder;
mod lexical;
mod memory;
mod multimodal;
mod pipeline;
mod rerank;
mod rewrite;
mod router;
mod vector;

#[cfg(test)]
mod mock;

pub use fusion::reciprocal_rank_fusion;
pub use guardrail::{GuardrailStage, PhraseGuardrail};
pub use lexical::LexicalRetriever;
pub use memory::{ConversationMemory, InMemorySessionStore, SessionStore};
pub use multimodal::ImageSelector;
pub use pipeline::{build_context, Pipeline, PipelineBackends};
pub use rerank::Reranker;
pub use rewrite::{clean_rewrite, RewriteStage};
pub use router::{KeywordIntentClassifier, RouterStage};
pub use vector::VectorRetriever;

// Re-export for convenience
pub use ciceron_core::{ChatResponse, PipelineOutcome};
pub use tokio_util::sync::CancellationToken;
