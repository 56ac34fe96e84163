//! Shared ONNX Runtime session setup.

use std::path::Path;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tokenizers::Tokenizer;
use tracing::info;

/// Build an inference session for `model_path`.
///
/// Errors are returned as plain messages so each backend can wrap them in
/// its own error kind.
pub(crate) fn build_session(
    model_path: &Path,
    num_threads: usize,
) -> std::result::Result<Session, String> {
    info!("Loading ONNX model from {:?}", model_path);

    Session::builder()
        .map_err(|e| format!("Failed to create session builder: {}", e))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| format!("Failed to set optimization level: {}", e))?
        .with_intra_threads(num_threads.max(1))
        .map_err(|e| format!("Failed to set thread count: {}", e))?
        .commit_from_file(model_path)
        .map_err(|e| format!("Failed to load model: {}", e))
}

pub(crate) fn load_tokenizer(tokenizer_path: &Path) -> std::result::Result<Tokenizer, String> {
    info!("Loading tokenizer from {:?}", tokenizer_path);

    Tokenizer::from_file(tokenizer_path).map_err(|e| format!("Failed to load tokenizer: {}", e))
}

/// Pack token ids and attention masks into row-major `[rows, max_len]`
/// buffers, truncating each row to `max_len`.
pub(crate) fn pad_batch(
    encodings: &[tokenizers::Encoding],
    max_len: usize,
) -> (Vec<i64>, Vec<i64>) {
    let rows = encodings.len();
    let mut input_ids = vec![0i64; rows * max_len];
    let mut attention_mask = vec![0i64; rows * max_len];

    for (i, encoding) in encodings.iter().enumerate() {
        let ids = encoding.get_ids();
        let mask = encoding.get_attention_mask();
        let len = ids.len().min(max_len);

        for j in 0..len {
            input_ids[i * max_len + j] = ids[j] as i64;
            attention_mask[i * max_len + j] = mask[j] as i64;
        }
    }

    (input_ids, attention_mask)
}
