//! JSON snapshot of an ingested corpus.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use ciceron_core::{
    CiceronError, Chunk, ChunkId, ChunkMetadata, Country, ImageRecord, Result, Topic,
};

/// A chunk as exported by ingestion, embedding included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotChunk {
    pub id: ChunkId,
    pub text: String,
    pub source: String,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub chunk_index: u32,
    #[serde(default)]
    pub country: Option<Country>,
    #[serde(default)]
    pub topics: Vec<Topic>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl SnapshotChunk {
    /// The stored chunk, without its embedding.
    pub fn to_chunk(&self) -> Chunk {
        Chunk {
            id: self.id.clone(),
            text: self.text.clone(),
            metadata: ChunkMetadata {
                source: self.source.clone(),
                page: self.page,
                chunk_index: self.chunk_index,
                country: self.country,
                topics: self.topics.clone(),
                title: self.title.clone(),
            },
        }
    }
}

/// Full corpus export: chunk collection plus image collection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub chunks: Vec<SnapshotChunk>,
    #[serde(default)]
    pub images: Vec<ImageRecord>,
}

/// Counts written by a snapshot load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub chunks: usize,
    pub embeddings: usize,
    pub images: usize,
}

impl Snapshot {
    /// Read and validate a snapshot file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: Self = serde_json::from_str(&content).map_err(|e| {
            CiceronError::snapshot(format!("{}: {}", path.display(), e))
        })?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Ids must be non-empty and unique; chunk embeddings share one dimension.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        let mut dimension = None;

        for chunk in &self.chunks {
            if chunk.id.as_str().is_empty() {
                return Err(CiceronError::snapshot("chunk with empty id"));
            }
            if !seen.insert(chunk.id.as_str()) {
                return Err(CiceronError::snapshot(format!(
                    "duplicate chunk id: {}",
                    chunk.id
                )));
            }
            if chunk.embedding.is_empty() {
                continue;
            }
            match dimension {
                None => dimension = Some(chunk.embedding.len()),
                Some(d) if d != chunk.embedding.len() => {
                    return Err(CiceronError::snapshot(format!(
                        "chunk {} has embedding dimension {}, expected {}",
                        chunk.id,
                        chunk.embedding.len(),
                        d
                    )));
                }
                Some(_) => {}
            }
        }

        let mut seen_images = HashSet::new();
        for image in &self.images {
            if image.id.as_str().is_empty() {
                return Err(CiceronError::snapshot("image with empty id"));
            }
            if !seen_images.insert(image.id.as_str()) {
                return Err(CiceronError::snapshot(format!(
                    "duplicate image id: {}",
                    image.id
                )));
            }
        }

        Ok(())
    }
}
