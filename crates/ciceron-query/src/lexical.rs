//! Lexical retrieval adapter.

use std::sync::Arc;

use tracing::{debug, warn};

use ciceron_core::{
    Degradation, IntentLabel, LexicalIndex, RankedCandidate, RetrievalStage, StageOutput,
};

use crate::budget::bounded;
use crate::ladder::{search_relaxing, to_ranked};

/// Keyword retrieval with filter relaxation.
pub struct LexicalRetriever {
    index: Arc<dyn LexicalIndex>,
    k: usize,
    timeout_ms: u64,
}

impl LexicalRetriever {
    pub fn new(index: Arc<dyn LexicalIndex>, k: usize, timeout_ms: u64) -> Self {
        Self {
            index,
            k,
            timeout_ms,
        }
    }

    /// Up to `k` ranked candidates for `query` under `label`.
    ///
    /// A backend error or timeout yields an empty list and a
    /// `LexicalUnavailable` marker.
    pub async fn retrieve(
        &self,
        query: &str,
        label: IntentLabel,
    ) -> StageOutput<Vec<RankedCandidate>> {
        let searched = search_relaxing(RetrievalStage::Lexical, label, move |filter| async move {
            bounded(
                "lexical",
                self.timeout_ms,
                self.index.lexical_search(query, &filter, self.k),
            )
            .await
        })
        .await;

        match searched {
            Ok(output) => {
                let ranked = to_ranked(output.value, self.k);
                debug!(hits = ranked.len(), "lexical retrieval done");
                StageOutput {
                    value: ranked,
                    degradations: output.degradations,
                }
            }
            Err(e) => {
                warn!(error = %e, "lexical index unavailable");
                StageOutput::degraded(
                    Vec::new(),
                    Degradation::LexicalUnavailable {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }
}
