//! Cross-encoder reranking of fused candidates.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, warn};

use ciceron_core::{
    Chunk, ChunkId, ChunkStore, CrossEncoder, Degradation, FusedCandidate, RerankedResult,
    StageOutput,
};

use crate::budget::bounded;

/// Rescores fused candidates pairwise and keeps the top `top_k`.
///
/// Never fails: unscorable candidates are dropped, and if nothing could be
/// scored the fused order is kept.
pub struct Reranker {
    chunks: Arc<dyn ChunkStore>,
    encoder: Arc<dyn CrossEncoder>,
    top_k: usize,
    fetch_timeout_ms: u64,
    score_timeout_ms: u64,
}

impl Reranker {
    pub fn new(
        chunks: Arc<dyn ChunkStore>,
        encoder: Arc<dyn CrossEncoder>,
        top_k: usize,
        fetch_timeout_ms: u64,
        score_timeout_ms: u64,
    ) -> Self {
        Self {
            chunks,
            encoder,
            top_k,
            fetch_timeout_ms,
            score_timeout_ms,
        }
    }

    pub async fn rerank(
        &self,
        query: &str,
        fused: &[FusedCandidate],
    ) -> StageOutput<Vec<RerankedResult>> {
        if fused.is_empty() {
            return StageOutput::clean(Vec::new());
        }

        let ids: Vec<ChunkId> = fused.iter().map(|c| c.chunk_id.clone()).collect();
        let fetched = match bounded(
            "chunk_fetch",
            self.fetch_timeout_ms,
            self.chunks.get_chunks(&ids),
        )
        .await
        {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(error = %e, "chunk store unavailable, nothing to rerank");
                return StageOutput::degraded(
                    Vec::new(),
                    Degradation::RerankUnavailable {
                        reason: e.to_string(),
                    },
                );
            }
        };

        let mut by_id: HashMap<ChunkId, Chunk> =
            fetched.into_iter().map(|c| (c.id.clone(), c)).collect();

        // (fused position, fused score, chunk) in fused order
        let candidates: Vec<(usize, f32, Chunk)> = fused
            .iter()
            .enumerate()
            .filter_map(|(pos, c)| by_id.remove(&c.chunk_id).map(|chunk| (pos, c.score, chunk)))
            .collect();

        let mut degradations = Vec::new();
        let missing = fused.len() - candidates.len();
        if missing > 0 {
            warn!(missing, "fused candidates missing from the chunk store");
            degradations.push(Degradation::MissingChunks { count: missing });
        }
        if candidates.is_empty() {
            return StageOutput {
                value: Vec::new(),
                degradations,
            };
        }

        let scores = join_all(candidates.iter().map(|(_, _, chunk)| {
            bounded(
                "rerank",
                self.score_timeout_ms,
                self.encoder.score(query, &chunk.text),
            )
        }))
        .await;

        let mut scored = Vec::with_capacity(candidates.len());
        let mut fallback = Vec::with_capacity(candidates.len());
        let mut last_error = None;
        for ((pos, fused_score, chunk), score) in candidates.into_iter().zip(scores) {
            match score {
                Ok(s) if s.is_finite() => scored.push((pos, s, chunk)),
                Ok(s) => {
                    last_error = Some(format!("non-finite score {s}"));
                    fallback.push((pos, fused_score, chunk));
                }
                Err(e) => {
                    last_error = Some(e.to_string());
                    fallback.push((pos, fused_score, chunk));
                }
            }
        }

        let ranked = if scored.is_empty() {
            let reason = last_error.unwrap_or_default();
            warn!(%reason, "cross-encoder unavailable, keeping fused order");
            degradations.push(Degradation::RerankUnavailable { reason });
            fallback
        } else {
            if !fallback.is_empty() {
                debug!(dropped = fallback.len(), "dropped unscorable candidates");
                degradations.push(Degradation::RerankPartial {
                    dropped: fallback.len(),
                });
            }
            scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            scored
        };

        let results: Vec<RerankedResult> = ranked
            .into_iter()
            .take(self.top_k)
            .map(|(_, score, chunk)| RerankedResult {
                chunk_id: chunk.id,
                score,
                text: chunk.text,
                metadata: chunk.metadata,
            })
            .collect();

        debug!(kept = results.len(), "rerank done");
        StageOutput {
            value: results,
            degradations,
        }
    }
}
