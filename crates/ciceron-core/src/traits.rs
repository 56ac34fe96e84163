//! Capability interfaces consumed by the pipeline.
//!
//! Each external capability gets its own trait; concrete backends are
//! injected as `Arc<dyn Trait>`.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Chunk, ChunkId, GuardrailVerdict, ImageRecord, IntentLabel, Turn};

/// Text embedding model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a search query.
    ///
    /// Backends apply their own query prefix for asymmetric retrieval.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the embedding dimension.
    fn dimension(&self) -> usize;
}

/// Keyword-scoring index over the chunk collection.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Up to `k` chunk ids matching `filter`, best first, with backend scores.
    ///
    /// Ranks the whole filtered subset: chunks without a keyword match score
    /// 0 and follow the matches in id order. Empty only when the subset is.
    async fn lexical_search(
        &self,
        query: &str,
        filter: &IntentLabel,
        k: usize,
    ) -> Result<Vec<(ChunkId, f32)>>;
}

/// Nearest-neighbour index over chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Up to `k` chunk ids matching `filter`, most similar first.
    async fn vector_search(
        &self,
        embedding: &[f32],
        filter: &IntentLabel,
        k: usize,
    ) -> Result<Vec<(ChunkId, f32)>>;
}

/// Read access to chunk texts and metadata.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Fetch chunks by id. Unknown ids are skipped, not errors.
    async fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>>;
}

/// Image-description collection.
#[async_trait]
pub trait ImageIndex: Send + Sync {
    /// All image records extracted from any of `sources`.
    async fn images_for_sources(&self, sources: &[&str]) -> Result<Vec<ImageRecord>>;
}

/// Pairwise relevance scorer.
#[async_trait]
pub trait CrossEncoder: Send + Sync {
    /// Relevance of `text` to `query`; higher is more relevant.
    async fn score(&self, query: &str, text: &str) -> Result<f32>;
}

/// Intent classifier producing a routing label.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, query: &str) -> Result<IntentLabel>;
}

/// Query rewriting model.
#[async_trait]
pub trait QueryRewriter: Send + Sync {
    /// Rewrite `query` into a retrieval-friendly form, resolving references
    /// to earlier turns in `history`.
    async fn rewrite(&self, query: &str, history: &[Turn]) -> Result<String>;
}

/// Answer generation model.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, context: &str, query: &str, history: &[Turn]) -> Result<String>;
}

/// Input safety check.
#[async_trait]
pub trait Guardrail: Send + Sync {
    async fn check(&self, raw_input: &str) -> Result<GuardrailVerdict>;
}
