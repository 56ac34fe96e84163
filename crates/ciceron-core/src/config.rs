//! Configuration types for Ciceron.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CiceronError, Result};

/// Upper bound for the reranker's top-K.
pub const MAX_TOP_K: usize = 10;

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CiceronConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,

    #[serde(default)]
    pub reranker: RerankerConfig,

    #[serde(default)]
    pub images: ImageConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub rewrite: RewriteConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub guardrail: GuardrailConfig,
}

/// Corpus database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite corpus file.
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_ms: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            busy_timeout_ms: default_busy_timeout(),
        }
    }
}

/// Text embedding model (E5-style).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Path to the ONNX model file.
    #[serde(default = "default_embedding_model")]
    pub model_path: PathBuf,

    /// Path to tokenizer.json.
    #[serde(default = "default_embedding_tokenizer")]
    pub tokenizer_path: PathBuf,

    #[serde(default = "default_embedding_dim")]
    pub dimension: usize,

    /// Prefix prepended to queries (passages were embedded with "passage: ").
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,

    #[serde(default = "default_model_max_tokens")]
    pub max_tokens: usize,

    /// Number of threads for CPU inference.
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_path: default_embedding_model(),
            tokenizer_path: default_embedding_tokenizer(),
            dimension: default_embedding_dim(),
            query_prefix: default_query_prefix(),
            max_tokens: default_model_max_tokens(),
            num_threads: default_num_threads(),
        }
    }
}

/// Cross-encoder reranker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    #[serde(default = "default_reranker_model")]
    pub model_path: PathBuf,

    #[serde(default = "default_reranker_tokenizer")]
    pub tokenizer_path: PathBuf,

    /// Results kept after reranking (1..=10).
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default = "default_model_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            model_path: default_reranker_model(),
            tokenizer_path: default_reranker_tokenizer(),
            top_k: default_top_k(),
            max_tokens: default_model_max_tokens(),
            num_threads: default_num_threads(),
        }
    }
}

/// Image selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Attach an image to answers when one is linked.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// CLIP text encoder used to rank linked images against the query.
    /// Without it, images are ranked by the chunk they link to.
    #[serde(default)]
    pub text_model_path: Option<PathBuf>,

    #[serde(default)]
    pub text_tokenizer_path: Option<PathBuf>,

    #[serde(default = "default_image_dim")]
    pub dimension: usize,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            text_model_path: None,
            text_tokenizer_path: None,
            dimension: default_image_dim(),
        }
    }
}

/// Retrieval and fusion sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// N_lex: lexical adapter list size.
    #[serde(default = "default_list_size")]
    pub lexical_k: usize,

    /// N_vec: vector adapter list size.
    #[serde(default = "default_list_size")]
    pub vector_k: usize,

    /// RRF smoothing constant k.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: u32,

    /// Fused list cap.
    #[serde(default = "default_list_size")]
    pub max_fused: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            lexical_k: default_list_size(),
            vector_k: default_list_size(),
            rrf_k: default_rrf_k(),
            max_fused: default_list_size(),
        }
    }
}

/// Query rewriting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewriteConfig {
    /// Rewrites longer than this are treated as degenerate.
    #[serde(default = "default_rewrite_max_chars")]
    pub max_chars: usize,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            max_chars: default_rewrite_max_chars(),
        }
    }
}

/// Which intent classifier backs the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierKind {
    #[default]
    Keyword,
    Llm,
}

/// OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL up to and including the API version, e.g. `http://localhost:11434/v1`.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Model used for answers.
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Model used for rewriting and classification; defaults to `model`.
    #[serde(default)]
    pub rewrite_model: Option<String>,

    #[serde(default)]
    pub classifier: ClassifierKind,

    /// Sampling temperature for answers.
    #[serde(default)]
    pub temperature: f32,

    #[serde(default = "default_max_answer_tokens")]
    pub max_answer_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_llm_base_url(),
            api_key_env: default_api_key_env(),
            model: default_llm_model(),
            rewrite_model: None,
            classifier: ClassifierKind::default(),
            temperature: 0.0,
            max_answer_tokens: default_max_answer_tokens(),
        }
    }
}

impl LlmConfig {
    /// Resolve the API key from the configured environment variable.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env).ok().filter(|k| !k.is_empty())
    }

    pub fn rewrite_model(&self) -> &str {
        self.rewrite_model.as_deref().unwrap_or(&self.model)
    }
}

/// Conversation memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Turns kept per session (one exchange is two turns).
    #[serde(default = "default_memory_turns")]
    pub max_turns: usize,

    /// Most recent turns offered to the rewriter.
    #[serde(default = "default_memory_turns")]
    pub rewrite_turns: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_memory_turns(),
            rewrite_turns: default_memory_turns(),
        }
    }
}

/// Per-call budgets in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_fast_ms")]
    pub guardrail_ms: u64,

    #[serde(default = "default_model_ms")]
    pub rewrite_ms: u64,

    #[serde(default = "default_model_ms")]
    pub classify_ms: u64,

    #[serde(default = "default_fast_ms")]
    pub embed_ms: u64,

    #[serde(default = "default_fast_ms")]
    pub lexical_ms: u64,

    #[serde(default = "default_fast_ms")]
    pub vector_ms: u64,

    #[serde(default = "default_fast_ms")]
    pub chunk_fetch_ms: u64,

    /// Per (query, chunk) pair.
    #[serde(default = "default_fast_ms")]
    pub rerank_ms: u64,

    #[serde(default = "default_fast_ms")]
    pub image_ms: u64,

    #[serde(default = "default_generate_ms")]
    pub generate_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            guardrail_ms: default_fast_ms(),
            rewrite_ms: default_model_ms(),
            classify_ms: default_model_ms(),
            embed_ms: default_fast_ms(),
            lexical_ms: default_fast_ms(),
            vector_ms: default_fast_ms(),
            chunk_fetch_ms: default_fast_ms(),
            rerank_ms: default_fast_ms(),
            image_ms: default_fast_ms(),
            generate_ms: default_generate_ms(),
        }
    }
}

/// Input guardrail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailConfig {
    /// Phrases that mark a prompt-injection attempt.
    #[serde(default = "default_blocked_phrases")]
    pub blocked_phrases: Vec<String>,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            blocked_phrases: default_blocked_phrases(),
        }
    }
}

// Default value functions

fn default_true() -> bool {
    true
}

fn default_busy_timeout() -> u32 {
    30000
}

fn default_embedding_dim() -> usize {
    768
}

fn default_image_dim() -> usize {
    512
}

fn default_query_prefix() -> String {
    "query: ".to_string()
}

fn default_model_max_tokens() -> usize {
    512
}

fn default_num_threads() -> usize {
    4
}

fn default_top_k() -> usize {
    5
}

fn default_list_size() -> usize {
    50
}

fn default_rrf_k() -> u32 {
    60
}

fn default_rewrite_max_chars() -> usize {
    512
}

fn default_llm_base_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_api_key_env() -> String {
    "LLM_API_KEY".to_string()
}

fn default_llm_model() -> String {
    "llama3".to_string()
}

fn default_max_answer_tokens() -> u32 {
    1024
}

fn default_memory_turns() -> usize {
    6
}

fn default_fast_ms() -> u64 {
    5_000
}

fn default_model_ms() -> u64 {
    15_000
}

fn default_generate_ms() -> u64 {
    60_000
}

fn default_blocked_phrases() -> Vec<String> {
    [
        "ignore previous instructions",
        "ignore your instructions",
        "forget your rules",
        "system override",
        "your new role is",
        "ignora tus instrucciones",
        "olvida tus reglas",
        "actua como",
        "tu nuevo rol es",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ciceron")
}

fn default_database_path() -> PathBuf {
    data_dir().join("corpus.db")
}

fn default_embedding_model() -> PathBuf {
    data_dir()
        .join("models")
        .join("multilingual-e5-base")
        .join("model.onnx")
}

fn default_embedding_tokenizer() -> PathBuf {
    data_dir()
        .join("models")
        .join("multilingual-e5-base")
        .join("tokenizer.json")
}

fn default_reranker_model() -> PathBuf {
    data_dir()
        .join("models")
        .join("bge-reranker-v2-m3")
        .join("model.onnx")
}

fn default_reranker_tokenizer() -> PathBuf {
    data_dir()
        .join("models")
        .join("bge-reranker-v2-m3")
        .join("tokenizer.json")
}

impl CiceronConfig {
    /// Load configuration from file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| CiceronError::config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths.
    pub fn load_default() -> Result<Self> {
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ciceron").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        let local_config = PathBuf::from("ciceron.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Reject settings the pipeline cannot honour.
    pub fn validate(&self) -> Result<()> {
        if self.retrieval.rrf_k == 0 {
            return Err(CiceronError::config("retrieval.rrf_k must be at least 1"));
        }
        if self.reranker.top_k == 0 || self.reranker.top_k > MAX_TOP_K {
            return Err(CiceronError::config(format!(
                "reranker.top_k must be between 1 and {MAX_TOP_K}"
            )));
        }
        if self.retrieval.lexical_k == 0
            || self.retrieval.vector_k == 0
            || self.retrieval.max_fused == 0
        {
            return Err(CiceronError::config("retrieval list sizes must be positive"));
        }
        if self.memory.max_turns == 0 {
            return Err(CiceronError::config("memory.max_turns must be positive"));
        }
        Ok(())
    }
}
