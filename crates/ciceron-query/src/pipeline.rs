//! Request orchestration: guardrail through generation.

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use ciceron_core::{
    ChatResponse, ChunkStore, CiceronConfig, CrossEncoder, Degradation, Embedder, Generator,
    Guardrail, GuardrailVerdict, ImageIndex, ImageRef, IntentClassifier, IntentLabel,
    LexicalIndex, PipelineOutcome, QueryRewriter, RerankedResult, Result, Turn, VectorIndex,
};

use crate::budget::bounded;
use crate::fusion::reciprocal_rank_fusion;
use crate::guardrail::GuardrailStage;
use crate::lexical::LexicalRetriever;
use crate::memory::{ConversationMemory, SessionStore};
use crate::multimodal::ImageSelector;
use crate::rerank::Reranker;
use crate::rewrite::RewriteStage;
use crate::router::RouterStage;
use crate::vector::VectorRetriever;

const EMPTY_QUERY_MESSAGE: &str = "¿Sobre qué lugar de Japón o España quieres preguntar?";

const DENIED_MESSAGE: &str =
    "Lo siento, solo puedo ayudarte con preguntas sobre viajes a Japón y España.";

const NO_CONTEXT_MESSAGE: &str =
    "Lo siento, no he encontrado información sobre eso en mis guías de Japón y España.";

const FAILED_MESSAGE: &str = "Lo siento, no he podido preparar una respuesta en este momento. \
     Inténtalo de nuevo en unos minutos.";

/// Capability backends the pipeline is assembled from.
pub struct PipelineBackends {
    pub guardrail: Arc<dyn Guardrail>,
    pub rewriter: Arc<dyn QueryRewriter>,
    pub classifier: Arc<dyn IntentClassifier>,
    pub lexical: Arc<dyn LexicalIndex>,
    pub vector: Arc<dyn VectorIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub chunks: Arc<dyn ChunkStore>,
    pub cross_encoder: Arc<dyn CrossEncoder>,
    /// Image collection; `None` disables image selection.
    pub images: Option<Arc<dyn ImageIndex>>,
    /// Query encoder in the image embedding space.
    pub image_embedder: Option<Arc<dyn Embedder>>,
    pub generator: Arc<dyn Generator>,
}

/// Everything generation needs, gathered before it starts.
struct Grounding {
    rewritten_query: String,
    label: IntentLabel,
    results: Vec<RerankedResult>,
    image: Option<ImageRef>,
    degradations: Vec<Degradation>,
}

enum Prepared {
    Denied { reason: String },
    NoContext,
    Ready(Grounding),
}

/// The retrieval-augmented answering pipeline.
///
/// Stages before generation degrade instead of failing and record a
/// [`Degradation`] marker; only generation failure, an empty retrieval or a
/// guardrail denial end a request without an answer.
pub struct Pipeline {
    guardrail: GuardrailStage,
    rewrite: RewriteStage,
    router: RouterStage,
    lexical: LexicalRetriever,
    vector: VectorRetriever,
    rrf_k: u32,
    max_fused: usize,
    reranker: Reranker,
    images: ImageSelector,
    generator: Arc<dyn Generator>,
    generate_timeout_ms: u64,
}

impl Pipeline {
    pub fn new(backends: PipelineBackends, config: &CiceronConfig) -> Self {
        let timeouts = &config.timeouts;
        Self {
            guardrail: GuardrailStage::new(backends.guardrail, timeouts.guardrail_ms),
            rewrite: RewriteStage::new(
                backends.rewriter,
                timeouts.rewrite_ms,
                config.memory.rewrite_turns,
                config.rewrite.max_chars,
            ),
            router: RouterStage::new(backends.classifier, timeouts.classify_ms),
            lexical: LexicalRetriever::new(
                backends.lexical,
                config.retrieval.lexical_k,
                timeouts.lexical_ms,
            ),
            vector: VectorRetriever::new(
                backends.embedder,
                backends.vector,
                config.retrieval.vector_k,
                timeouts.embed_ms,
                timeouts.vector_ms,
            ),
            rrf_k: config.retrieval.rrf_k,
            max_fused: config.retrieval.max_fused,
            reranker: Reranker::new(
                backends.chunks,
                backends.cross_encoder,
                config.reranker.top_k,
                timeouts.chunk_fetch_ms,
                timeouts.rerank_ms,
            ),
            images: ImageSelector::new(
                backends.images,
                backends.image_embedder,
                timeouts.image_ms,
            ),
            generator: backends.generator,
            generate_timeout_ms: timeouts.generate_ms,
        }
    }

    /// Answer one query, reading and extending `memory`.
    ///
    /// Cancelling `cancel` before generation starts drops every in-flight
    /// call. Once generation has started it runs to completion and its
    /// answer is discarded. Memory only changes for answered requests.
    #[instrument(skip_all, fields(query_chars = query.chars().count()))]
    pub async fn answer(
        &self,
        query: &str,
        memory: &mut ConversationMemory,
        cancel: &CancellationToken,
    ) -> PipelineOutcome {
        let start = Instant::now();

        let query = query.trim();
        if query.is_empty() {
            return PipelineOutcome::Failed {
                reason: "empty query".to_string(),
                message: EMPTY_QUERY_MESSAGE.to_string(),
            };
        }
        if cancel.is_cancelled() {
            return PipelineOutcome::Cancelled;
        }

        let history = memory.turns();

        let prepared = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("request cancelled before generation");
                return PipelineOutcome::Cancelled;
            }
            prepared = self.prepare(query, &history) => prepared,
        };

        let grounding = match prepared {
            Prepared::Ready(grounding) => grounding,
            Prepared::Denied { reason } => {
                return PipelineOutcome::Denied {
                    reason,
                    message: DENIED_MESSAGE.to_string(),
                }
            }
            Prepared::NoContext => {
                warn!("no context retrieved, even unfiltered");
                return PipelineOutcome::Failed {
                    reason: "no context retrieved".to_string(),
                    message: NO_CONTEXT_MESSAGE.to_string(),
                };
            }
        };

        let context = build_context(&grounding.results);
        let generated = bounded(
            "generate",
            self.generate_timeout_ms,
            self.generator
                .generate(&context, &grounding.rewritten_query, &history),
        )
        .await;

        if cancel.is_cancelled() {
            info!("request cancelled during generation, answer discarded");
            return PipelineOutcome::Cancelled;
        }

        let answer = match generated {
            Ok(answer) if !answer.trim().is_empty() => answer.trim().to_string(),
            Ok(_) => return failed("generator returned an empty answer".to_string()),
            Err(e) => {
                error!(error = %e, code = e.error_code(), "generation failed");
                return failed(e.to_string());
            }
        };

        memory.record_exchange(query, answer.as_str());

        let cited_chunk_ids = grounding
            .results
            .iter()
            .map(|r| r.chunk_id.clone())
            .collect();
        let sources = distinct_sources(&grounding.results);
        let verified_sources = grounding
            .degradations
            .is_empty()
            .then_some(sources.len());
        let latency_ms = start.elapsed().as_millis() as u64;

        info!(
            latency_ms,
            label = %grounding.label,
            chunks = grounding.results.len(),
            degraded = grounding.degradations.len(),
            "request answered"
        );

        PipelineOutcome::Answered(ChatResponse {
            answer,
            rewritten_query: grounding.rewritten_query,
            label: grounding.label,
            cited_chunk_ids,
            sources,
            image: grounding.image,
            degraded: grounding.degradations,
            verified_sources,
            latency_ms,
        })
    }

    /// Answer within a session, loading and saving its memory.
    pub async fn answer_in_session(
        &self,
        sessions: &dyn SessionStore,
        session_id: &str,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<PipelineOutcome> {
        let mut memory = sessions.load(session_id).await?;
        let outcome = self.answer(query, &mut memory, cancel).await;
        if matches!(outcome, PipelineOutcome::Answered(_)) {
            sessions.save(session_id, memory).await?;
        }
        Ok(outcome)
    }

    /// Everything up to generation.
    async fn prepare(&self, query: &str, history: &[Turn]) -> Prepared {
        let mut degradations = Vec::new();

        let verdict = self.guardrail.check(query).await;
        degradations.extend(verdict.degradations);
        if let GuardrailVerdict::Deny { reason } = verdict.value {
            warn!(%reason, "request denied by guardrail");
            return Prepared::Denied { reason };
        }

        let rewritten = self.rewrite.rewrite(query, history).await;
        degradations.extend(rewritten.degradations);
        let rewritten_query = rewritten.value;

        let routed = self.router.route(&rewritten_query).await;
        degradations.extend(routed.degradations);
        let label = routed.value;

        let (lexical, vector) = tokio::join!(
            self.lexical.retrieve(&rewritten_query, label),
            self.vector.retrieve(&rewritten_query, label)
        );
        degradations.extend(lexical.degradations);
        degradations.extend(vector.degradations);

        let fused =
            reciprocal_rank_fusion(&lexical.value, &vector.value, self.rrf_k, self.max_fused);
        debug!(
            lexical = lexical.value.len(),
            vector = vector.value.len(),
            fused = fused.len(),
            "retrieval fused"
        );
        if fused.is_empty() {
            return Prepared::NoContext;
        }

        let reranked = self.reranker.rerank(&rewritten_query, &fused).await;
        degradations.extend(reranked.degradations);
        if reranked.value.is_empty() {
            return Prepared::NoContext;
        }

        let image = self.images.select(&rewritten_query, &reranked.value).await;
        degradations.extend(image.degradations);

        Prepared::Ready(Grounding {
            rewritten_query,
            label,
            results: reranked.value,
            image: image.value,
            degradations,
        })
    }
}

fn failed(reason: String) -> PipelineOutcome {
    PipelineOutcome::Failed {
        reason,
        message: FAILED_MESSAGE.to_string(),
    }
}

/// Grounding context handed to the generator, one attributed block per chunk.
pub fn build_context(results: &[RerankedResult]) -> String {
    results
        .iter()
        .map(|r| {
            format!(
                "--- Source: {} [{}] ---\n{}",
                r.metadata.attribution(),
                r.chunk_id,
                r.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn distinct_sources(results: &[RerankedResult]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for result in results {
        if !sources.contains(&result.metadata.source) {
            sources.push(result.metadata.source.clone());
        }
    }
    sources
}
