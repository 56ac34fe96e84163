//! Vector retrieval adapter.

use std::sync::Arc;

use tracing::{debug, warn};

use ciceron_core::{
    CiceronError, Degradation, Embedder, IntentLabel, RankedCandidate, RetrievalStage,
    StageOutput, VectorIndex,
};

use crate::budget::bounded;
use crate::ladder::{search_relaxing, to_ranked};

/// Embeds the query, then searches the vector index with filter relaxation.
pub struct VectorRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    k: usize,
    embed_timeout_ms: u64,
    search_timeout_ms: u64,
}

impl VectorRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        k: usize,
        embed_timeout_ms: u64,
        search_timeout_ms: u64,
    ) -> Self {
        Self {
            embedder,
            index,
            k,
            embed_timeout_ms,
            search_timeout_ms,
        }
    }

    /// Up to `k` candidates by similarity. Embedding or search failure
    /// yields an empty list and a `VectorUnavailable` marker.
    pub async fn retrieve(
        &self,
        query: &str,
        label: IntentLabel,
    ) -> StageOutput<Vec<RankedCandidate>> {
        let embedding =
            match bounded("embed", self.embed_timeout_ms, self.embedder.embed_query(query)).await {
                Ok(embedding) => embedding,
                Err(e) => return unavailable(e),
            };
        let embedding = embedding.as_slice();

        let searched = search_relaxing(RetrievalStage::Vector, label, move |filter| async move {
            bounded(
                "vector",
                self.search_timeout_ms,
                self.index.vector_search(embedding, &filter, self.k),
            )
            .await
        })
        .await;

        match searched {
            Ok(output) => {
                let ranked = to_ranked(output.value, self.k);
                debug!(hits = ranked.len(), "vector retrieval done");
                StageOutput {
                    value: ranked,
                    degradations: output.degradations,
                }
            }
            Err(e) => unavailable(e),
        }
    }
}

fn unavailable(error: CiceronError) -> StageOutput<Vec<RankedCandidate>> {
    warn!(%error, "vector retrieval unavailable");
    StageOutput::degraded(
        Vec::new(),
        Degradation::VectorUnavailable {
            reason: error.to_string(),
        },
    )
}
