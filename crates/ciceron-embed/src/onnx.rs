//! ONNX-based text embedding model implementation.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ndarray::ArrayViewD;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::{debug, info};

use ciceron_core::{CiceronError, Embedder, EmbeddingConfig, Result};

use crate::session::{build_session, load_tokenizer, pad_batch};

/// Output names that already hold pooled sentence vectors.
const POOLED_OUTPUTS: [&str; 3] = ["sentence_embedding", "text_embeds", "pooler_output"];

/// ONNX embedder for multilingual-e5 or a compatible encoder.
///
/// Only queries are embedded at request time; passages were embedded at
/// ingestion with the matching `passage: ` prefix.
pub struct OnnxEmbedder {
    /// ONNX inference session (wrapped in Mutex for interior mutability).
    session: Mutex<Session>,

    /// Tokenizer for the model.
    tokenizer: Arc<Tokenizer>,

    /// Prefix prepended to every query.
    query_prefix: String,

    /// Embedding dimension.
    dimension: usize,

    /// Maximum token count.
    max_tokens: usize,
}

impl OnnxEmbedder {
    /// Create an embedder from the embedding section of the configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        Self::new(
            &config.model_path,
            &config.tokenizer_path,
            &config.query_prefix,
            config.dimension,
            config.max_tokens,
            config.num_threads,
        )
    }

    /// Create an embedder from model and tokenizer paths.
    ///
    /// # Arguments
    /// * `model_path` - Path to the ONNX model file
    /// * `tokenizer_path` - Path to the tokenizer.json file
    /// * `query_prefix` - Prefix for asymmetric retrieval (`""` for CLIP)
    pub fn new(
        model_path: impl AsRef<Path>,
        tokenizer_path: impl AsRef<Path>,
        query_prefix: &str,
        dimension: usize,
        max_tokens: usize,
        num_threads: usize,
    ) -> Result<Self> {
        let session = build_session(model_path.as_ref(), num_threads)
            .map_err(CiceronError::embedding)?;
        let tokenizer =
            load_tokenizer(tokenizer_path.as_ref()).map_err(CiceronError::embedding)?;

        info!(
            "Embedder initialized: dim={}, max_tokens={}",
            dimension, max_tokens
        );

        Ok(Self {
            session: Mutex::new(session),
            tokenizer: Arc::new(tokenizer),
            query_prefix: query_prefix.to_string(),
            dimension,
            max_tokens,
        })
    }

    /// Embed a batch of texts with the query prefix.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prefixed: Vec<String> = texts
            .iter()
            .map(|t| format!("{}{}", self.query_prefix, t))
            .collect();
        let prefixed_refs: Vec<&str> = prefixed.iter().map(|s| s.as_str()).collect();

        let encodings = self
            .tokenizer
            .encode_batch(prefixed_refs, true)
            .map_err(|e| CiceronError::embedding(format!("Tokenization failed: {}", e)))?;

        // Get max length for padding
        let max_len = encodings
            .iter()
            .map(|e| e.get_ids().len())
            .max()
            .unwrap_or(0)
            .min(self.max_tokens);

        let batch_size = encodings.len();

        debug!("Embedding batch: size={}, max_len={}", batch_size, max_len);

        let (input_ids, attention_mask) = pad_batch(&encodings, max_len);

        let input_ids_tensor = Tensor::from_array((vec![batch_size, max_len], input_ids))
            .map_err(|e| {
                CiceronError::embedding(format!("Failed to create input tensor: {}", e))
            })?;

        let attention_mask_tensor =
            Tensor::from_array((vec![batch_size, max_len], attention_mask)).map_err(|e| {
                CiceronError::embedding(format!("Failed to create mask tensor: {}", e))
            })?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| CiceronError::embedding(format!("Failed to lock session: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor
            ])
            .map_err(|e| CiceronError::embedding(format!("Inference failed: {}", e)))?;

        // Prefer an already-pooled output; otherwise the first output is the
        // token-level hidden state
        let output = outputs
            .iter()
            .find(|(name, _)| POOLED_OUTPUTS.iter().any(|p| *p == name.to_string()))
            .or_else(|| outputs.iter().next())
            .map(|(_, value)| value)
            .ok_or_else(|| CiceronError::embedding("No output tensor found"))?;

        let view = output
            .try_extract_array::<f32>()
            .map_err(|e| CiceronError::embedding(format!("Failed to extract tensor: {}", e)))?;

        let shape_dims: Vec<usize> = view.shape().to_vec();
        debug!("Output shape: {:?}", shape_dims);

        let embeddings = match shape_dims.len() {
            // (batch_size, seq_len, hidden_dim) - need mean pooling
            3 => mean_pool(&view, &encodings, max_len),
            // (batch_size, hidden_dim) - already pooled
            2 => {
                let hidden_dim = shape_dims[1];
                (0..batch_size)
                    .map(|i| l2_normalize((0..hidden_dim).map(|j| view[[i, j]]).collect()))
                    .collect()
            }
            _ => {
                return Err(CiceronError::embedding(format!(
                    "Unexpected output shape: {:?}",
                    shape_dims
                )))
            }
        };

        if let Some(first) = embeddings.first() {
            if first.len() != self.dimension {
                return Err(CiceronError::embedding(format!(
                    "Model produced dimension {}, configured {}",
                    first.len(),
                    self.dimension
                )));
            }
        }

        Ok(embeddings)
    }
}

/// Mean pooling over the sequence dimension with attention mask.
///
/// Works with an ndarray view of shape [batch, seq, hidden].
fn mean_pool(
    tensor: &ArrayViewD<'_, f32>,
    encodings: &[tokenizers::Encoding],
    max_len: usize,
) -> Vec<Vec<f32>> {
    let shape = tensor.shape();
    let seq_len = shape[1];
    let hidden_dim = shape[2];

    encodings
        .iter()
        .enumerate()
        .map(|(i, encoding)| {
            let mask = encoding.get_attention_mask();
            let mut sum = vec![0.0f32; hidden_dim];
            let mut valid = 0usize;

            for (j, &m) in mask.iter().enumerate().take(max_len.min(seq_len)) {
                if m == 1 {
                    valid += 1;
                    for (k, s) in sum.iter_mut().enumerate() {
                        *s += tensor[[i, j, k]];
                    }
                }
            }

            if valid == 0 {
                return sum;
            }
            l2_normalize(sum.into_iter().map(|s| s / valid as f32).collect())
        })
        .collect()
}

/// L2 normalize a vector.
pub(crate) fn l2_normalize(mut v: Vec<f32>) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in &mut v {
            *x /= norm;
        }
    }
    v
}

#[async_trait]
impl Embedder for OnnxEmbedder {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        // Inference runs inline; the session is serialized by its mutex
        let texts = [text];
        let results = self.embed_batch(&texts)?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| CiceronError::embedding("No embedding returned"))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
