//! ciceron-embed - ONNX model wrappers
//!
//! This crate provides the model-backed capabilities of the retrieval
//! pipeline:
//!
//! - [`OnnxEmbedder`]: query embeddings for E5-style models (`query: ` /
//!   `passage: ` prefixes), mean pooling and L2 normalization. Also loads
//!   CLIP text encoders for image ranking.
//! - [`OnnxCrossEncoder`]: (query, passage) relevance scores from a
//!   sequence-classification reranker.
//! - [`MockEmbedder`]: deterministic bag-of-words embeddings for tests.

mod cross_encoder;
mod mock;
mod onnx;
mod session;

pub use cross_encoder::OnnxCrossEncoder;
pub use mock::MockEmbedder;
pub use onnx::OnnxEmbedder;

// Re-export the capability traits for convenience
pub use ciceron_core::{CrossEncoder, Embedder};
