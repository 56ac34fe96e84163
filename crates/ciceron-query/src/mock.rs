//! In-crate test doubles for the pipeline capabilities.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use ciceron_core::similarity::cosine_similarity;
use ciceron_core::text::keyword_tokens;
use ciceron_core::{
    Chunk, ChunkId, ChunkMetadata, ChunkStore, CiceronError, Country, CrossEncoder, Embedder,
    Generator, Guardrail, GuardrailVerdict, ImageId, ImageIndex, ImageRecord, IntentClassifier,
    IntentLabel, LexicalIndex, QueryRewriter, Result, Topic, Turn, VectorIndex,
};
use ciceron_embed::MockEmbedder;

/// Every capability, always failing.
pub struct Broken;

fn broken<T>() -> Result<T> {
    Err(CiceronError::internal("backend down"))
}

#[async_trait]
impl Guardrail for Broken {
    async fn check(&self, _raw_input: &str) -> Result<GuardrailVerdict> {
        broken()
    }
}

#[async_trait]
impl QueryRewriter for Broken {
    async fn rewrite(&self, _query: &str, _history: &[Turn]) -> Result<String> {
        broken()
    }
}

#[async_trait]
impl IntentClassifier for Broken {
    async fn classify(&self, _query: &str) -> Result<IntentLabel> {
        broken()
    }
}

#[async_trait]
impl Embedder for Broken {
    async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
        broken()
    }

    fn dimension(&self) -> usize {
        768
    }
}

#[async_trait]
impl LexicalIndex for Broken {
    async fn lexical_search(
        &self,
        _query: &str,
        _filter: &IntentLabel,
        _k: usize,
    ) -> Result<Vec<(ChunkId, f32)>> {
        broken()
    }
}

#[async_trait]
impl VectorIndex for Broken {
    async fn vector_search(
        &self,
        _embedding: &[f32],
        _filter: &IntentLabel,
        _k: usize,
    ) -> Result<Vec<(ChunkId, f32)>> {
        broken()
    }
}

#[async_trait]
impl ChunkStore for Broken {
    async fn get_chunks(&self, _ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        broken()
    }
}

#[async_trait]
impl ImageIndex for Broken {
    async fn images_for_sources(&self, _sources: &[&str]) -> Result<Vec<ImageRecord>> {
        broken()
    }
}

#[async_trait]
impl CrossEncoder for Broken {
    async fn score(&self, _query: &str, _text: &str) -> Result<f32> {
        broken()
    }
}

#[async_trait]
impl Generator for Broken {
    async fn generate(&self, _context: &str, _query: &str, _history: &[Turn]) -> Result<String> {
        broken()
    }
}

/// Never answers.
pub struct Pending;

#[async_trait]
impl QueryRewriter for Pending {
    async fn rewrite(&self, _query: &str, _history: &[Turn]) -> Result<String> {
        std::future::pending().await
    }
}

#[async_trait]
impl IntentClassifier for Pending {
    async fn classify(&self, _query: &str) -> Result<IntentLabel> {
        std::future::pending().await
    }
}

/// Returns the same rewrite for every query.
pub struct FixedRewriter(String);

impl FixedRewriter {
    pub fn new(answer: &str) -> Self {
        Self(answer.to_string())
    }
}

#[async_trait]
impl QueryRewriter for FixedRewriter {
    async fn rewrite(&self, _query: &str, _history: &[Turn]) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Echoes the query and records the history it was offered.
#[derive(Default)]
pub struct RecordingRewriter {
    histories: Mutex<Vec<Vec<Turn>>>,
}

impl RecordingRewriter {
    pub fn histories(&self) -> Vec<Vec<Turn>> {
        self.histories.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryRewriter for RecordingRewriter {
    async fn rewrite(&self, query: &str, history: &[Turn]) -> Result<String> {
        self.histories.lock().unwrap().push(history.to_vec());
        Ok(query.to_string())
    }
}

/// Always assigns the same label.
pub struct FixedClassifier(pub IntentLabel);

#[async_trait]
impl IntentClassifier for FixedClassifier {
    async fn classify(&self, _query: &str) -> Result<IntentLabel> {
        Ok(self.0)
    }
}

/// Chunks and images held in memory, searchable like the SQLite corpus.
///
/// Lexical score is the number of distinct query words in the chunk; vector
/// score is the cosine of [`MockEmbedder`] bag-of-words vectors.
pub struct MemoryIndex {
    chunks: Vec<Chunk>,
    images: Vec<ImageRecord>,
    embedder: MockEmbedder,
}

impl MemoryIndex {
    pub fn new(chunks: Vec<Chunk>, images: Vec<ImageRecord>) -> Self {
        Self {
            chunks,
            images,
            embedder: MockEmbedder::new(),
        }
    }

    /// Six chunks from a Madrid guide and a Japan guide, two images.
    pub fn guide_corpus() -> Self {
        let embedder = MockEmbedder::new();
        let image = |id: &str, source: &str, page: u32, description: &str, country| ImageRecord {
            id: ImageId::new(id),
            description: description.to_string(),
            source: source.to_string(),
            page: Some(page),
            path: format!("img/{id}.png"),
            country: Some(country),
            embedding: embedder.embed_passage(description),
        };

        Self::new(
            vec![
                chunk(
                    "madrid_prado",
                    "El Museo del Prado guarda la gran colección de pintura española de Madrid.",
                    "guia_madrid.pdf",
                    12,
                    Country::Spain,
                    &[Topic::Sightseeing],
                ),
                chunk(
                    "madrid_tapas",
                    "En el barrio de La Latina de Madrid las tapas se toman de pie en la barra.",
                    "guia_madrid.pdf",
                    30,
                    Country::Spain,
                    &[Topic::Food],
                ),
                chunk(
                    "madrid_japones",
                    "Madrid tiene restaurantes de comida japonesa con sushi y ramen en Chamberí.",
                    "guia_madrid.pdf",
                    31,
                    Country::Spain,
                    &[Topic::Food],
                ),
                chunk(
                    "kioto_templos",
                    "Los templos de Kioto, como el Kinkaku-ji, abren temprano.",
                    "guia_japon.pdf",
                    40,
                    Country::Japan,
                    &[Topic::Sightseeing],
                ),
                chunk(
                    "tokio_ramen",
                    "En Tokio hay puestos de ramen en cada estación de metro.",
                    "guia_japon.pdf",
                    8,
                    Country::Japan,
                    &[Topic::Food],
                ),
                chunk(
                    "tokio_tren",
                    "El Japan Rail Pass cubre el shinkansen entre Tokio y Kioto.",
                    "guia_japon.pdf",
                    3,
                    Country::Japan,
                    &[Topic::Transport],
                ),
            ],
            vec![
                image(
                    "guia_japon_img_40_0",
                    "guia_japon.pdf",
                    40,
                    "Pabellón dorado del templo Kinkaku-ji en Kioto",
                    Country::Japan,
                ),
                image(
                    "guia_madrid_img_12_0",
                    "guia_madrid.pdf",
                    12,
                    "Sala de pintura del Museo del Prado",
                    Country::Spain,
                ),
            ],
        )
    }

    fn filtered<'a>(&'a self, filter: &'a IntentLabel) -> impl Iterator<Item = &'a Chunk> {
        self.chunks.iter().filter(|c| filter.matches(&c.metadata))
    }
}

pub fn chunk(
    id: &str,
    text: &str,
    source: &str,
    page: u32,
    country: Country,
    topics: &[Topic],
) -> Chunk {
    Chunk {
        id: ChunkId::from(id),
        text: text.to_string(),
        metadata: ChunkMetadata {
            page: Some(page),
            country: Some(country),
            topics: topics.to_vec(),
            ..ChunkMetadata::new(source)
        },
    }
}

fn sorted_top(mut hits: Vec<(ChunkId, f32)>, k: usize) -> Vec<(ChunkId, f32)> {
    hits.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    hits.truncate(k);
    hits
}

#[async_trait]
impl LexicalIndex for MemoryIndex {
    async fn lexical_search(
        &self,
        query: &str,
        filter: &IntentLabel,
        k: usize,
    ) -> Result<Vec<(ChunkId, f32)>> {
        // Every chunk of the subset is scored, zero overlap included
        let words: HashSet<String> = keyword_tokens(query).into_iter().collect();
        let scored = self
            .filtered(filter)
            .map(|c| {
                let chunk_words: HashSet<String> = keyword_tokens(&c.text).into_iter().collect();
                let overlap = words.intersection(&chunk_words).count();
                (c.id.clone(), overlap as f32)
            })
            .collect();
        Ok(sorted_top(scored, k))
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn vector_search(
        &self,
        embedding: &[f32],
        filter: &IntentLabel,
        k: usize,
    ) -> Result<Vec<(ChunkId, f32)>> {
        let hits = self
            .filtered(filter)
            .map(|c| {
                let passage = self.embedder.embed_passage(&c.text);
                (c.id.clone(), cosine_similarity(embedding, &passage))
            })
            .collect();
        Ok(sorted_top(hits, k))
    }
}

#[async_trait]
impl ChunkStore for MemoryIndex {
    async fn get_chunks(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.chunks.iter().find(|c| &c.id == id).cloned())
            .collect())
    }
}

#[async_trait]
impl ImageIndex for MemoryIndex {
    async fn images_for_sources(&self, sources: &[&str]) -> Result<Vec<ImageRecord>> {
        Ok(self
            .images
            .iter()
            .filter(|i| sources.contains(&i.source.as_str()))
            .cloned()
            .collect())
    }
}

/// Scores a passage by the first scripted substring it contains; fails
/// for passages matching none.
#[derive(Default)]
pub struct ScriptedEncoder {
    scores: Vec<(String, f32)>,
}

impl ScriptedEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn score(mut self, needle: &str, score: f32) -> Self {
        self.scores.push((needle.to_string(), score));
        self
    }
}

#[async_trait]
impl CrossEncoder for ScriptedEncoder {
    async fn score(&self, _query: &str, text: &str) -> Result<f32> {
        self.scores
            .iter()
            .find(|(needle, _)| text.contains(needle.as_str()))
            .map(|(_, score)| *score)
            .ok_or_else(|| CiceronError::rerank("no score scripted"))
    }
}

/// Scores a passage by the number of query words it shares.
pub struct OverlapEncoder;

#[async_trait]
impl CrossEncoder for OverlapEncoder {
    async fn score(&self, query: &str, text: &str) -> Result<f32> {
        let words: HashSet<String> = keyword_tokens(query).into_iter().collect();
        let shared = keyword_tokens(text)
            .into_iter()
            .collect::<HashSet<_>>()
            .intersection(&words)
            .count();
        Ok(shared as f32)
    }
}

/// Arguments of one `generate` call.
#[derive(Debug, Clone)]
pub struct GenerateCall {
    pub context: String,
    pub query: String,
    pub history: Vec<Turn>,
}

/// Answers with a fixed text after an optional delay and records its calls.
pub struct RecordingGenerator {
    answer: String,
    delay: Duration,
    calls: Mutex<Vec<GenerateCall>>,
    completed: AtomicUsize,
}

impl RecordingGenerator {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            completed: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<GenerateCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls that ran to completion.
    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    async fn generate(&self, context: &str, query: &str, history: &[Turn]) -> Result<String> {
        self.calls.lock().unwrap().push(GenerateCall {
            context: context.to_string(),
            query: query.to_string(),
            history: history.to_vec(),
        });
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer.clone())
    }
}
