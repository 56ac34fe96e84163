//! Filter relaxation shared by the lexical and vector adapters.

use std::collections::HashSet;
use std::future::Future;

use tracing::debug;

use ciceron_core::{
    ChunkId, Degradation, IntentLabel, RankedCandidate, Result, RetrievalStage, StageOutput,
};

/// Run `search` under `label`, widening the filter while it comes back empty.
///
/// Both indexes rank every chunk of a non-empty filtered subset, so an empty
/// result means the subset itself is empty. Walks country+topic → country →
/// unspecified and records one `FilterRelaxed` marker per step taken. Errors
/// stop the walk.
pub(crate) async fn search_relaxing<F, Fut>(
    stage: RetrievalStage,
    label: IntentLabel,
    mut search: F,
) -> Result<StageOutput<Vec<(ChunkId, f32)>>>
where
    F: FnMut(IntentLabel) -> Fut,
    Fut: Future<Output = Result<Vec<(ChunkId, f32)>>>,
{
    let mut filter = label;
    let mut degradations = Vec::new();

    loop {
        let hits = search(filter).await?;
        if !hits.is_empty() {
            return Ok(StageOutput {
                value: hits,
                degradations,
            });
        }

        match filter.relax() {
            Some(wider) => {
                debug!(%stage, from = %filter, to = %wider, "empty filtered subset, relaxing");
                degradations.push(Degradation::FilterRelaxed {
                    stage,
                    from: filter,
                    to: wider,
                });
                filter = wider;
            }
            None => {
                return Ok(StageOutput {
                    value: hits,
                    degradations,
                })
            }
        }
    }
}

/// Turn backend hits into a 1-based ranked list of at most `k` distinct ids.
///
/// Order is score descending, ties by chunk id ascending.
pub(crate) fn to_ranked(mut hits: Vec<(ChunkId, f32)>, k: usize) -> Vec<RankedCandidate> {
    hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|(id, _)| seen.insert(id.clone()))
        .take(k)
        .enumerate()
        .map(|(i, (chunk_id, score))| RankedCandidate {
            chunk_id,
            rank: i as u32 + 1,
            score,
        })
        .collect()
}
