//! Error types for the Ciceron pipeline.

use thiserror::Error;

/// Result type alias using CiceronError.
pub type Result<T> = std::result::Result<T, CiceronError>;

/// Errors raised by capability backends and the storage layer.
///
/// Pipeline stages never surface these directly for expected degradation;
/// they are turned into [`Degradation`](crate::Degradation) markers.
#[derive(Error, Debug)]
pub enum CiceronError {
    /// Chunk not found in the corpus.
    #[error("Chunk not found: {id}")]
    ChunkNotFound { id: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// Database error.
    #[error("Database error: {message}")]
    Database { message: String },

    /// Embedding model error.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// Cross-encoder error.
    #[error("Rerank error: {message}")]
    Rerank { message: String },

    /// Chat model transport or API error.
    #[error("LLM error: {message}")]
    Llm { message: String },

    /// A model answered with something that does not parse.
    #[error("Malformed model output: {message}")]
    MalformedOutput { message: String },

    /// A capability call exceeded its budget.
    #[error("{stage} timed out after {after_ms}ms")]
    Timeout { stage: String, after_ms: u64 },

    /// Snapshot file could not be loaded.
    #[error("Snapshot error: {message}")]
    Snapshot { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl CiceronError {
    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create a rerank error.
    pub fn rerank(message: impl Into<String>) -> Self {
        Self::Rerank {
            message: message.into(),
        }
    }

    /// Create an LLM error.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm {
            message: message.into(),
        }
    }

    /// Create a malformed output error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedOutput {
            message: message.into(),
        }
    }

    /// Create a timeout error for a named stage.
    pub fn timeout(stage: impl Into<String>, after_ms: u64) -> Self {
        Self::Timeout {
            stage: stage.into(),
            after_ms,
        }
    }

    /// Create a snapshot error.
    pub fn snapshot(message: impl Into<String>) -> Self {
        Self::Snapshot {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable machine-readable code, used in logs and JSON output.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ChunkNotFound { .. } => "CHUNK_NOT_FOUND",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::Rerank { .. } => "RERANK_ERROR",
            Self::Llm { .. } => "LLM_ERROR",
            Self::MalformedOutput { .. } => "MALFORMED_OUTPUT",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Snapshot { .. } => "SNAPSHOT_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CiceronError::ChunkNotFound {
            id: "guia_madrid_chunk_3".to_string(),
        };
        assert!(err.to_string().contains("guia_madrid_chunk_3"));

        let err = CiceronError::timeout("rerank", 1500);
        assert_eq!(err.to_string(), "rerank timed out after 1500ms");
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            CiceronError::database("locked").error_code(),
            "DATABASE_ERROR"
        );
        assert_eq!(CiceronError::timeout("embed", 10).error_code(), "TIMEOUT");
        assert_eq!(
            CiceronError::malformed("label").error_code(),
            "MALFORMED_OUTPUT"
        );
    }
}
