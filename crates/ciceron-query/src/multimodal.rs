//! Picks at most one guide image to attach to an answer.

use std::sync::Arc;

use tracing::{debug, warn};

use ciceron_core::similarity::cosine_similarity;
use ciceron_core::{
    Degradation, Embedder, ImageIndex, ImageRecord, ImageRef, RerankedResult, StageOutput,
};

use crate::budget::bounded;

/// Selects an image linked to the reranked chunks.
///
/// Candidates are images from the same source and page as one of the
/// chunks. With a text encoder for the image space they are ordered by
/// similarity to the query; otherwise by the rank of the chunk they link to.
pub struct ImageSelector {
    images: Option<Arc<dyn ImageIndex>>,
    embedder: Option<Arc<dyn Embedder>>,
    timeout_ms: u64,
}

impl ImageSelector {
    pub fn new(
        images: Option<Arc<dyn ImageIndex>>,
        embedder: Option<Arc<dyn Embedder>>,
        timeout_ms: u64,
    ) -> Self {
        Self {
            images,
            embedder,
            timeout_ms,
        }
    }

    pub async fn select(
        &self,
        query: &str,
        results: &[RerankedResult],
    ) -> StageOutput<Option<ImageRef>> {
        let Some(images) = &self.images else {
            return StageOutput::clean(None);
        };
        if results.is_empty() {
            return StageOutput::clean(None);
        }

        let mut sources: Vec<&str> = Vec::new();
        for result in results {
            let source = result.metadata.source.as_str();
            if !sources.contains(&source) {
                sources.push(source);
            }
        }

        let records = match bounded("image", self.timeout_ms, images.images_for_sources(&sources))
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "image lookup failed, answering without image");
                return StageOutput::degraded(
                    None,
                    Degradation::ImageUnavailable {
                        reason: e.to_string(),
                    },
                );
            }
        };

        // (linked chunk rank, image)
        let linked: Vec<(usize, ImageRecord)> = records
            .into_iter()
            .filter_map(|image| {
                results
                    .iter()
                    .position(|r| image.links_to(&r.metadata))
                    .map(|rank| (rank, image))
            })
            .collect();
        if linked.is_empty() {
            return StageOutput::clean(None);
        }

        // Without a query vector every similarity is 0 and chunk rank decides
        let query_embedding = self.query_embedding(query, &linked).await;
        let mut ranked: Vec<(f32, usize, ImageRecord)> = linked
            .into_iter()
            .map(|(rank, image)| {
                let similarity = query_embedding
                    .as_deref()
                    .map_or(0.0, |q| cosine_similarity(q, &image.embedding));
                (similarity, rank, image)
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.0.total_cmp(&a.0)
                .then_with(|| a.1.cmp(&b.1))
                .then_with(|| a.2.id.cmp(&b.2.id))
        });

        let chosen = ranked.into_iter().next().map(|(_, _, image)| ImageRef {
            id: image.id,
            path: image.path,
            description: image.description,
        });
        debug!(image = ?chosen.as_ref().map(|i| i.id.as_str()), "image selected");
        StageOutput::clean(chosen)
    }

    /// Query vector in the image space, when similarity ranking is possible.
    async fn query_embedding(
        &self,
        query: &str,
        linked: &[(usize, ImageRecord)],
    ) -> Option<Vec<f32>> {
        let embedder = self.embedder.as_ref()?;
        if linked.iter().all(|(_, image)| image.embedding.is_empty()) {
            return None;
        }
        match bounded("image", self.timeout_ms, embedder.embed_query(query)).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!(error = %e, "image text encoder failed, ranking by chunk order");
                None
            }
        }
    }
}
