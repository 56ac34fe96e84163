//! Deterministic embedder for tests and offline runs.

use async_trait::async_trait;

use ciceron_core::text::keyword_tokens;
use ciceron_core::{Embedder, Result};

use crate::onnx::l2_normalize;

/// A mock embedder that doesn't require actual models.
///
/// Each accent-folded token is hashed into one bucket, so texts that share
/// words get a positive cosine similarity. Queries and passages use the
/// same mapping.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    /// Create a new mock embedder with default settings.
    pub fn new() -> Self {
        Self { dimension: 768 }
    }

    /// Create a mock embedder with a custom dimension.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    /// Embed a passage, e.g. to build a test snapshot.
    pub fn embed_passage(&self, text: &str) -> Vec<f32> {
        self.bag_of_words(text)
    }

    fn bag_of_words(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];
        for token in keyword_tokens(text) {
            // FNV-1a
            let hash = token.bytes().fold(0xcbf29ce484222325u64, |acc, b| {
                (acc ^ b as u64).wrapping_mul(0x100000001b3)
            });
            embedding[(hash % self.dimension as u64) as usize] += 1.0;
        }
        l2_normalize(embedding)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.bag_of_words(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ciceron_core::similarity::cosine_similarity;

    #[tokio::test]
    async fn test_mock_embedder_query() {
        let embedder = MockEmbedder::new();

        let embedding = embedder.embed_query("ramen en Tokio").await.unwrap();
        assert_eq!(embedding.len(), 768);

        // Check L2 normalization
        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_deterministic_embeddings() {
        let embedder = MockEmbedder::new();

        let e1 = embedder.embed_query("consistent input").await.unwrap();
        let e2 = embedder.embed_query("consistent input").await.unwrap();
        assert_eq!(e1, e2);
        assert_eq!(e1, embedder.embed_passage("Consistent INPUT"));
    }

    #[tokio::test]
    async fn test_shared_words_are_closer() {
        let embedder = MockEmbedder::new();

        let query = embedder.embed_query("museos en Madrid").await.unwrap();
        let near = embedder.embed_passage("Los mejores museos de Madrid");
        let far = embedder.embed_passage("Ramen en Shinjuku");

        assert!(cosine_similarity(&query, &near) > cosine_similarity(&query, &far));
    }

    #[tokio::test]
    async fn test_mock_embedder_custom_dimension() {
        let embedder = MockEmbedder::with_dimension(16);
        assert_eq!(embedder.dimension(), 16);

        let embedding = embedder.embed_query("test").await.unwrap();
        assert_eq!(embedding.len(), 16);

        let empty = embedder.embed_query("¿?").await.unwrap();
        assert!(empty.iter().all(|x| *x == 0.0));
    }
}
