//! ONNX cross-encoder for reranking.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use ciceron_core::{CiceronError, CrossEncoder, RerankerConfig, Result};

use crate::session::{build_session, load_tokenizer, pad_batch};

/// Sequence-classification reranker (bge-reranker style).
///
/// The query and passage are encoded as one pair; the first logit is the
/// relevance score. Scores are raw logits, only comparable to each other.
pub struct OnnxCrossEncoder {
    session: Mutex<Session>,
    tokenizer: Arc<Tokenizer>,
    max_tokens: usize,
}

impl OnnxCrossEncoder {
    pub fn from_config(config: &RerankerConfig) -> Result<Self> {
        Self::new(
            &config.model_path,
            &config.tokenizer_path,
            config.max_tokens,
            config.num_threads,
        )
    }

    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        max_tokens: usize,
        num_threads: usize,
    ) -> Result<Self> {
        let session =
            build_session(model_path.as_ref(), num_threads).map_err(CiceronError::rerank)?;
        let tokenizer = load_tokenizer(tokenizer_path.as_ref()).map_err(CiceronError::rerank)?;

        info!("Cross-encoder initialized: max_tokens={}", max_tokens);

        Ok(Self {
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            max_tokens,
        })
    }

    fn score_pair(&self, query: &str, text: &str) -> Result<f32> {
        let encoding = self
            .tokenizer
            .encode((query, text), true)
            .map_err(|e| CiceronError::rerank(format!("Tokenization failed: {}", e)))?;

        let seq_len = encoding.get_ids().len().min(self.max_tokens);
        let (input_ids, attention_mask) = pad_batch(std::slice::from_ref(&encoding), seq_len);

        let input_ids_tensor = Tensor::from_array((vec![1, seq_len], input_ids))
            .map_err(|e| CiceronError::rerank(format!("Failed to create input tensor: {}", e)))?;
        let attention_mask_tensor = Tensor::from_array((vec![1, seq_len], attention_mask))
            .map_err(|e| CiceronError::rerank(format!("Failed to create mask tensor: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| CiceronError::rerank(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])
            .map_err(|e| CiceronError::rerank(format!("Inference failed: {}", e)))?;

        let (_, logits) = outputs
            .iter()
            .next()
            .ok_or_else(|| CiceronError::rerank("No output tensor found"))?;

        let view = logits
            .try_extract_array::<f32>()
            .map_err(|e| CiceronError::rerank(format!("Failed to extract tensor: {}", e)))?;

        let score = view
            .iter()
            .next()
            .copied()
            .ok_or_else(|| CiceronError::rerank("Empty logits tensor"))?;

        if !score.is_finite() {
            return Err(CiceronError::rerank(format!("Non-finite score: {}", score)));
        }

        debug!(seq_len, score, "cross-encoder pair scored");
        Ok(score)
    }
}

#[async_trait]
impl CrossEncoder for OnnxCrossEncoder {
    async fn score(&self, query: &str, text: &str) -> Result<f32> {
        self.score_pair(query, text)
    }
}
