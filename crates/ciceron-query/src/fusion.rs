//! Reciprocal Rank Fusion (RRF) for combining search results.

use std::collections::HashMap;

use ciceron_core::{ChunkId, FusedCandidate, RankedCandidate};

/// Fuse the lexical and vector lists using Reciprocal Rank Fusion.
///
/// RRF score = Σ 1 / (k + rank_i), with 1-based ranks, summed over the
/// lists an id appears in. An id listed twice in the same list counts once,
/// at its best rank.
///
/// Output is sorted by fused score descending, then best rank across the
/// inputs, then chunk id, and truncated to `max_results`. The result is
/// fully determined by the inputs.
pub fn reciprocal_rank_fusion(
    lexical: &[RankedCandidate],
    vector: &[RankedCandidate],
    k: u32,
    max_results: usize,
) -> Vec<FusedCandidate> {
    let mut fused: HashMap<ChunkId, FusedCandidate> = HashMap::new();

    for candidate in lexical {
        let entry = entry(&mut fused, &candidate.chunk_id);
        entry.lexical_rank = Some(best(entry.lexical_rank, candidate.rank));
    }
    for candidate in vector {
        let entry = entry(&mut fused, &candidate.chunk_id);
        entry.vector_rank = Some(best(entry.vector_rank, candidate.rank));
    }

    let mut fused: Vec<FusedCandidate> = fused
        .into_values()
        .map(|mut c| {
            c.score = [c.lexical_rank, c.vector_rank]
                .into_iter()
                .flatten()
                .map(|rank| rrf_term(k, rank))
                .sum();
            c
        })
        .collect();

    fused.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.min_rank().cmp(&b.min_rank()))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused.truncate(max_results);

    fused
}

fn entry<'a>(
    fused: &'a mut HashMap<ChunkId, FusedCandidate>,
    id: &ChunkId,
) -> &'a mut FusedCandidate {
    fused.entry(id.clone()).or_insert_with(|| FusedCandidate {
        chunk_id: id.clone(),
        score: 0.0,
        lexical_rank: None,
        vector_rank: None,
    })
}

fn best(current: Option<u32>, rank: u32) -> u32 {
    current.map_or(rank, |r| r.min(rank))
}

fn rrf_term(k: u32, rank: u32) -> f32 {
    1.0 / (k as f32 + rank as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranked(ids: &[&str]) -> Vec<RankedCandidate> {
        ids.iter()
            .enumerate()
            .map(|(i, id)| RankedCandidate {
                chunk_id: ChunkId::from(*id),
                rank: i as u32 + 1,
                score: 0.0,
            })
            .collect()
    }

    fn ids(fused: &[FusedCandidate]) -> Vec<&str> {
        fused.iter().map(|c| c.chunk_id.as_str()).collect()
    }

    #[test]
    fn test_rrf_single_list() {
        let fused = reciprocal_rank_fusion(&ranked(&["a", "b", "c"]), &[], 60, 10);

        assert_eq!(ids(&fused), ["a", "b", "c"]);
        assert_eq!(fused[0].lexical_rank, Some(1));
        assert_eq!(fused[0].vector_rank, None);
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-7);
    }

    #[test]
    fn test_rrf_rewards_agreement() {
        let lexical = ranked(&["a", "b", "c"]);
        let vector = ranked(&["b", "a", "d"]);

        let fused = reciprocal_rank_fusion(&lexical, &vector, 60, 10);

        // a and b both score 1/61 + 1/62; a wins on id
        assert_eq!(ids(&fused), ["a", "b", "c", "d"]);
        assert!((fused[0].score - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-6);
        assert_eq!(fused[1].lexical_rank, Some(2));
        assert_eq!(fused[1].vector_rank, Some(1));
    }

    #[test]
    fn test_rrf_disjoint_lists_tie_on_id() {
        let fused = reciprocal_rank_fusion(&ranked(&["x"]), &ranked(&["w"]), 60, 10);

        assert_eq!(ids(&fused), ["w", "x"]);
        assert_eq!(fused[0].score, fused[1].score);
    }

    #[test]
    fn test_rrf_mirrored_positions_tie() {
        let lexical = ranked(&["b", "z"]);
        let vector = ranked(&["z", "b"]);
        let fused = reciprocal_rank_fusion(&lexical, &vector, 60, 10);

        // Same score, same best rank: id decides
        assert_eq!(ids(&fused), ["b", "z"]);
        assert_eq!(fused[0].min_rank(), 1);
    }

    #[test]
    fn test_rrf_duplicate_in_list_counts_once() {
        let lexical = vec![
            RankedCandidate {
                chunk_id: ChunkId::from("a"),
                rank: 1,
                score: 0.0,
            },
            RankedCandidate {
                chunk_id: ChunkId::from("a"),
                rank: 2,
                score: 0.0,
            },
        ];
        let fused = reciprocal_rank_fusion(&lexical, &[], 60, 10);

        assert_eq!(fused.len(), 1);
        assert_eq!(fused[0].lexical_rank, Some(1));
        assert!((fused[0].score - 1.0 / 61.0).abs() < 1e-7);
    }

    #[test]
    fn test_rrf_truncation() {
        let fused = reciprocal_rank_fusion(&ranked(&["a", "b", "c", "d", "e"]), &[], 60, 3);
        assert_eq!(ids(&fused), ["a", "b", "c"]);
    }

    #[test]
    fn test_rrf_list_with_itself() {
        let list = ranked(&["q", "b", "m"]);
        let fused = reciprocal_rank_fusion(&list, &list, 60, 50);

        assert_eq!(ids(&fused), ["q", "b", "m"]);
        for (i, c) in fused.iter().enumerate() {
            let expected = 2.0 / (61 + i) as f32;
            assert!((c.score - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_rrf_is_deterministic() {
        let lexical = ranked(&["m", "k", "q", "a"]);
        let vector = ranked(&["q", "z", "m"]);

        let first = reciprocal_rank_fusion(&lexical, &vector, 60, 50);
        let second = reciprocal_rank_fusion(&lexical, &vector, 60, 50);
        assert_eq!(first, second);
    }

    #[test]
    fn test_rrf_empty_inputs() {
        assert!(reciprocal_rank_fusion(&[], &[], 60, 50).is_empty());
    }
}
