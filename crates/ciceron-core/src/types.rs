//! Core domain types for the Ciceron pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CiceronError;
use crate::text::fold_accents;

/// Stable identifier of a chunk, assigned at ingestion (e.g. `guia_madrid_chunk_12`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(String);

impl ChunkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChunkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Stable identifier of an image record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Countries covered by the guide corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Country {
    Japan,
    Spain,
}

impl Country {
    pub const ALL: [Country; 2] = [Country::Japan, Country::Spain];

    /// Storage/wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Japan => "japan",
            Self::Spain => "spain",
        }
    }
}

impl fmt::Display for Country {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Country {
    type Err = CiceronError;

    /// Accepts English and Spanish names, with or without accents.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match fold_accents(&s.trim().to_lowercase()).as_str() {
            "japan" | "japon" => Ok(Self::Japan),
            "spain" | "espana" => Ok(Self::Spain),
            other => Err(CiceronError::invalid_argument(format!(
                "unknown country: {other}"
            ))),
        }
    }
}

/// Topic tags attached to chunks at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Topic {
    Food,
    Lodging,
    Sightseeing,
    Transport,
    Shopping,
}

impl Topic {
    pub const ALL: [Topic; 5] = [
        Topic::Food,
        Topic::Lodging,
        Topic::Sightseeing,
        Topic::Transport,
        Topic::Shopping,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Food => "food",
            Self::Lodging => "lodging",
            Self::Sightseeing => "sightseeing",
            Self::Transport => "transport",
            Self::Shopping => "shopping",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Topic {
    type Err = CiceronError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        Topic::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| CiceronError::invalid_argument(format!("unknown topic: {s}")))
    }
}

/// Routing label for a request.
///
/// Both fields `None` is the "unspecified" label, which applies no filter.
/// The label doubles as the metadata predicate handed to the index adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct IntentLabel {
    pub country: Option<Country>,
    pub topic: Option<Topic>,
}

impl IntentLabel {
    pub const UNSPECIFIED: IntentLabel = IntentLabel {
        country: None,
        topic: None,
    };

    pub fn country(country: Country) -> Self {
        Self {
            country: Some(country),
            topic: None,
        }
    }

    pub fn with_topic(mut self, topic: Topic) -> Self {
        self.topic = Some(topic);
        self
    }

    pub fn is_unspecified(&self) -> bool {
        self.country.is_none() && self.topic.is_none()
    }

    /// Whether a chunk satisfies this label as a filter.
    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        let country_ok = match self.country {
            Some(c) => metadata.country == Some(c),
            None => true,
        };
        let topic_ok = match self.topic {
            Some(t) => metadata.topics.contains(&t),
            None => true,
        };
        country_ok && topic_ok
    }

    /// Next, wider filter on the relaxation ladder.
    ///
    /// country+topic → country → unspecified; topic-only → unspecified.
    /// Returns `None` once the label is already unspecified.
    pub fn relax(&self) -> Option<IntentLabel> {
        match (self.country, self.topic) {
            (Some(c), Some(_)) => Some(IntentLabel::country(c)),
            (None, None) => None,
            _ => Some(IntentLabel::UNSPECIFIED),
        }
    }
}

impl fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.country, self.topic) {
            (None, None) => f.write_str("unspecified"),
            (Some(c), None) => write!(f, "{c}"),
            (None, Some(t)) => write!(f, "{t}"),
            (Some(c), Some(t)) => write!(f, "{c}/{t}"),
        }
    }
}

impl FromStr for IntentLabel {
    type Err = CiceronError;

    /// Parses the `Display` form: `unspecified`, `spain`, `food`, `japan/food`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase();
        if s == "unspecified" || s == "unknown" {
            return Ok(Self::UNSPECIFIED);
        }

        match s.split_once('/') {
            Some((country, topic)) => Ok(Self {
                country: Some(country.parse()?),
                topic: Some(topic.parse()?),
            }),
            None => {
                if let Ok(country) = s.parse::<Country>() {
                    Ok(Self::country(country))
                } else {
                    Ok(Self {
                        country: None,
                        topic: Some(s.parse()?),
                    })
                }
            }
        }
    }
}

/// Source metadata of a chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Origin file the chunk was cut from.
    pub source: String,

    /// Page within the source, when known.
    #[serde(default)]
    pub page: Option<u32>,

    /// Position of the chunk within its source (0-based).
    #[serde(default)]
    pub chunk_index: u32,

    #[serde(default)]
    pub country: Option<Country>,

    #[serde(default)]
    pub topics: Vec<Topic>,

    /// Guide title, when the ingestion metadata had one.
    #[serde(default)]
    pub title: Option<String>,
}

impl ChunkMetadata {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page: None,
            chunk_index: 0,
            country: None,
            topics: Vec::new(),
            title: None,
        }
    }

    /// Human-readable attribution used in grounding context blocks.
    pub fn attribution(&self) -> String {
        match self.page {
            Some(page) => format!("{} (p. {})", self.source, page),
            None => self.source.clone(),
        }
    }
}

/// A chunk of a guide document. Immutable after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// An image extracted from a guide, linked to chunks by source and page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,
    pub description: String,
    pub source: String,
    #[serde(default)]
    pub page: Option<u32>,
    pub path: String,
    #[serde(default)]
    pub country: Option<Country>,
    #[serde(default)]
    pub embedding: Vec<f32>,
}

impl ImageRecord {
    /// Same source, and same page when both sides know their page.
    pub fn links_to(&self, chunk: &ChunkMetadata) -> bool {
        if self.source != chunk.source {
            return false;
        }
        match (self.page, chunk.page) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// One entry of an adapter's ranked list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub chunk_id: ChunkId,
    /// 1-based rank.
    pub rank: u32,
    /// Backend-specific score; not comparable across adapters.
    pub score: f32,
}

/// One entry of the fused list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedCandidate {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub lexical_rank: Option<u32>,
    pub vector_rank: Option<u32>,
}

impl FusedCandidate {
    /// Best (lowest) rank across the input lists.
    pub fn min_rank(&self) -> u32 {
        match (self.lexical_rank, self.vector_rank) {
            (Some(a), Some(b)) => a.min(b),
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => u32::MAX,
        }
    }
}

/// A candidate after cross-encoder reranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RerankedResult {
    pub chunk_id: ChunkId,
    pub score: f32,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single conversation turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
        }
    }
}

/// Verdict of the input guardrail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "lowercase")]
pub enum GuardrailVerdict {
    Allow,
    Deny { reason: String },
}

/// Which retrieval adapter a marker refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStage {
    Lexical,
    Vector,
}

impl fmt::Display for RetrievalStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexical => f.write_str("lexical"),
            Self::Vector => f.write_str("vector"),
        }
    }
}

/// A stage produced a best-effort result instead of a full one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Degradation {
    GuardrailUnavailable { reason: String },
    RewriteFallback { reason: String },
    RouterFallback { reason: String },
    FilterRelaxed {
        stage: RetrievalStage,
        from: IntentLabel,
        to: IntentLabel,
    },
    LexicalUnavailable { reason: String },
    VectorUnavailable { reason: String },
    MissingChunks { count: usize },
    RerankPartial { dropped: usize },
    RerankUnavailable { reason: String },
    ImageUnavailable { reason: String },
}

/// Value of a pipeline stage plus the markers it accumulated.
#[derive(Debug, Clone, PartialEq)]
pub struct StageOutput<T> {
    pub value: T,
    pub degradations: Vec<Degradation>,
}

impl<T> StageOutput<T> {
    /// Full result, nothing degraded.
    pub fn clean(value: T) -> Self {
        Self {
            value,
            degradations: Vec::new(),
        }
    }

    pub fn degraded(value: T, degradation: Degradation) -> Self {
        Self {
            value,
            degradations: vec![degradation],
        }
    }

    pub fn is_degraded(&self) -> bool {
        !self.degradations.is_empty()
    }
}

/// Image attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    pub id: ImageId,
    pub path: String,
    pub description: String,
}

/// Structured result handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub rewritten_query: String,
    pub label: IntentLabel,
    pub cited_chunk_ids: Vec<ChunkId>,
    /// Distinct source files of the cited chunks, in citation order.
    pub sources: Vec<String>,
    pub image: Option<ImageRef>,
    pub degraded: Vec<Degradation>,
    /// "Verified against N sources"; only set for undegraded answers.
    pub verified_sources: Option<usize>,
    pub latency_ms: u64,
}

/// Terminal state of one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineOutcome {
    Answered(ChatResponse),
    /// Blocked by the guardrail.
    Denied { reason: String, message: String },
    /// No answer could be produced; `message` is user-facing.
    Failed { reason: String, message: String },
    /// The caller cancelled before an answer was kept.
    Cancelled,
}

/// Corpus statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stats {
    pub chunks: u64,
    pub images: u64,
    pub embeddings: u64,
    pub storage_bytes: u64,
    /// Chunk counts per country label.
    pub by_country: Vec<(String, u64)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(country: Option<Country>, topics: &[Topic]) -> ChunkMetadata {
        ChunkMetadata {
            country,
            topics: topics.to_vec(),
            ..ChunkMetadata::new("guia.pdf")
        }
    }

    #[test]
    fn test_country_from_str() {
        assert_eq!("Japón".parse::<Country>().unwrap(), Country::Japan);
        assert_eq!("ESPAÑA".parse::<Country>().unwrap(), Country::Spain);
        assert_eq!("spain".parse::<Country>().unwrap(), Country::Spain);
        assert!("france".parse::<Country>().is_err());
    }

    #[test]
    fn test_label_display_roundtrip() {
        let labels = [
            IntentLabel::UNSPECIFIED,
            IntentLabel::country(Country::Japan),
            IntentLabel::country(Country::Spain).with_topic(Topic::Food),
            IntentLabel {
                country: None,
                topic: Some(Topic::Lodging),
            },
        ];
        for label in labels {
            assert_eq!(label.to_string().parse::<IntentLabel>().unwrap(), label);
        }
        assert!("mars/food".parse::<IntentLabel>().is_err());
    }

    #[test]
    fn test_label_matches() {
        let spain_food = IntentLabel::country(Country::Spain).with_topic(Topic::Food);
        assert!(spain_food.matches(&meta(Some(Country::Spain), &[Topic::Food, Topic::Shopping])));
        assert!(!spain_food.matches(&meta(Some(Country::Spain), &[Topic::Lodging])));
        assert!(!spain_food.matches(&meta(Some(Country::Japan), &[Topic::Food])));
        assert!(IntentLabel::UNSPECIFIED.matches(&meta(None, &[])));
    }

    #[test]
    fn test_label_relax_ladder() {
        let label = IntentLabel::country(Country::Japan).with_topic(Topic::Transport);
        let step1 = label.relax().unwrap();
        assert_eq!(step1, IntentLabel::country(Country::Japan));
        let step2 = step1.relax().unwrap();
        assert!(step2.is_unspecified());
        assert!(step2.relax().is_none());
    }

    #[test]
    fn test_image_links_to() {
        let image = ImageRecord {
            id: ImageId::new("guia_img_4_0"),
            description: "Templo".to_string(),
            source: "guia.pdf".to_string(),
            page: Some(4),
            path: "img/guia_pag4_img0.png".to_string(),
            country: Some(Country::Japan),
            embedding: Vec::new(),
        };

        let mut chunk = meta(Some(Country::Japan), &[]);
        assert!(image.links_to(&chunk));
        chunk.page = Some(4);
        assert!(image.links_to(&chunk));
        chunk.page = Some(5);
        assert!(!image.links_to(&chunk));
        chunk.source = "otra.pdf".to_string();
        chunk.page = Some(4);
        assert!(!image.links_to(&chunk));
    }

    #[test]
    fn test_fused_min_rank() {
        let c = FusedCandidate {
            chunk_id: ChunkId::from("a"),
            score: 0.0,
            lexical_rank: Some(7),
            vector_rank: Some(2),
        };
        assert_eq!(c.min_rank(), 2);
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let outcome = PipelineOutcome::Denied {
            reason: "prompt injection".to_string(),
            message: "no".to_string(),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "denied");
    }
}
