//! Intent routing: query → country/topic filter.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use ciceron_core::text::keyword_tokens;
use ciceron_core::{
    Country, Degradation, IntentClassifier, IntentLabel, Result, StageOutput, Topic,
};

use crate::budget::bounded;

// Whole words, accent-folded. Place names plus signature dishes and customs
// ("sushi", "tapas") count; demonyms and cuisine adjectives ("japonesa",
// "espanol") do not. A dish named next to the other country's city
// ("sushi en Madrid") therefore leaves the country unset.
const JAPAN_WORDS: &[&str] = &[
    "japon", "japan", "tokio", "tokyo", "kioto", "kyoto", "osaka", "nara", "hiroshima",
    "hokkaido", "sapporo", "okinawa", "fukuoka", "nikko", "hakone", "kamakura", "yokohama",
    "kanazawa", "nagoya", "miyajima", "akihabara", "shibuya", "shinjuku", "asakusa", "ginza",
    "harajuku", "fuji", "shinkansen", "ryokan", "onsen", "sushi", "ramen",
];

const SPAIN_WORDS: &[&str] = &[
    "espana", "spain", "madrid", "barcelona", "sevilla", "seville", "granada", "valencia",
    "bilbao", "malaga", "toledo", "cordoba", "salamanca", "segovia", "ibiza", "mallorca",
    "tenerife", "canarias", "andalucia", "cataluna", "catalonia", "galicia", "asturias",
    "tapas", "paella", "flamenco",
];

const FOOD_WORDS: &[&str] = &[
    "comer", "comida", "comidas", "restaurante", "restaurantes", "restaurant", "restaurants",
    "food", "eat", "gastronomia", "cenar", "cena", "desayuno", "almuerzo", "plato", "platos",
    "tapas", "sushi", "ramen", "paella", "izakaya",
];

const LODGING_WORDS: &[&str] = &[
    "hotel", "hoteles", "hotels", "alojamiento", "alojarse", "dormir", "hostal", "hostales",
    "albergue", "hostel", "ryokan", "apartamento", "lodging", "accommodation",
];

const SIGHTSEEING_WORDS: &[&str] = &[
    "ver", "visitar", "visita", "museo", "museos", "museum", "templo", "templos", "temple",
    "santuario", "monumento", "monumentos", "catedral", "castillo", "palacio", "mirador",
    "sightseeing", "turisticos",
];

const TRANSPORT_WORDS: &[&str] = &[
    "tren", "trenes", "train", "metro", "autobus", "bus", "shinkansen", "aeropuerto", "airport",
    "taxi", "billete", "billetes", "transporte", "transport", "moverse", "llegar",
];

const SHOPPING_WORDS: &[&str] = &[
    "comprar", "compras", "tienda", "tiendas", "mercado", "mercadillo", "souvenir",
    "souvenirs", "recuerdos", "shopping", "shop",
];

/// Rule-based classifier over whole accent-folded words.
///
/// A country is set only when the query names places or dishes of exactly one
/// country; a topic only when exactly one topic matches.
pub struct KeywordIntentClassifier {
    japan: HashSet<&'static str>,
    spain: HashSet<&'static str>,
    topics: Vec<(Topic, HashSet<&'static str>)>,
}

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        let set = |words: &[&'static str]| words.iter().copied().collect::<HashSet<_>>();
        Self {
            japan: set(JAPAN_WORDS),
            spain: set(SPAIN_WORDS),
            topics: vec![
                (Topic::Food, set(FOOD_WORDS)),
                (Topic::Lodging, set(LODGING_WORDS)),
                (Topic::Sightseeing, set(SIGHTSEEING_WORDS)),
                (Topic::Transport, set(TRANSPORT_WORDS)),
                (Topic::Shopping, set(SHOPPING_WORDS)),
            ],
        }
    }

    /// Synchronous classification, also used by `ciceron route`.
    pub fn label(&self, query: &str) -> IntentLabel {
        let tokens = keyword_tokens(query);
        let mentions = |words: &HashSet<&'static str>| {
            tokens.iter().any(|t| words.contains(t.as_str()))
        };

        let country = match (mentions(&self.japan), mentions(&self.spain)) {
            (true, false) => Some(Country::Japan),
            (false, true) => Some(Country::Spain),
            _ => None,
        };

        let matched: Vec<Topic> = self
            .topics
            .iter()
            .filter(|(_, words)| mentions(words))
            .map(|(topic, _)| *topic)
            .collect();
        let topic = match matched[..] {
            [single] => Some(single),
            _ => None,
        };

        IntentLabel { country, topic }
    }
}

impl Default for KeywordIntentClassifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, query: &str) -> Result<IntentLabel> {
        Ok(self.label(query))
    }
}

/// Routing step of the pipeline. Classifier failure maps to unspecified.
pub struct RouterStage {
    classifier: Arc<dyn IntentClassifier>,
    timeout_ms: u64,
}

impl RouterStage {
    pub fn new(classifier: Arc<dyn IntentClassifier>, timeout_ms: u64) -> Self {
        Self {
            classifier,
            timeout_ms,
        }
    }

    pub async fn route(&self, query: &str) -> StageOutput<IntentLabel> {
        match bounded("classify", self.timeout_ms, self.classifier.classify(query)).await {
            Ok(label) => {
                debug!(%label, "query routed");
                StageOutput::clean(label)
            }
            Err(e) => {
                warn!(error = %e, "router fell back to unspecified");
                StageOutput::degraded(
                    IntentLabel::UNSPECIFIED,
                    Degradation::RouterFallback {
                        reason: e.to_string(),
                    },
                )
            }
        }
    }
}
