//! Query normalization and rewriting.

use std::sync::Arc;

use tracing::{debug, warn};

use ciceron_core::text::normalize_query;
use ciceron_core::{Degradation, QueryRewriter, StageOutput, Turn};

use crate::budget::bounded;

/// Labels models like to put in front of the rewritten query.
const ANSWER_LABELS: [&str; 5] = [
    "rewritten query:",
    "consulta reescrita:",
    "consulta:",
    "query:",
    "búsqueda:",
];

const QUOTES: [char; 8] = ['"', '\'', '`', '“', '”', '«', '»', '‘'];

/// Rewrite step of the pipeline.
///
/// Always yields a non-empty query: a failed, slow or degenerate rewrite
/// falls back to the normalized raw query.
pub struct RewriteStage {
    rewriter: Arc<dyn QueryRewriter>,
    timeout_ms: u64,
    history_turns: usize,
    max_chars: usize,
}

impl RewriteStage {
    pub fn new(
        rewriter: Arc<dyn QueryRewriter>,
        timeout_ms: u64,
        history_turns: usize,
        max_chars: usize,
    ) -> Self {
        Self {
            rewriter,
            timeout_ms,
            history_turns,
            max_chars,
        }
    }

    pub async fn rewrite(&self, raw_query: &str, history: &[Turn]) -> StageOutput<String> {
        let recent = &history[history.len().saturating_sub(self.history_turns)..];
        let fallback = normalize_query(raw_query);

        let reason = match bounded(
            "rewrite",
            self.timeout_ms,
            self.rewriter.rewrite(raw_query, recent),
        )
        .await
        {
            Ok(answer) => match clean_rewrite(&answer, self.max_chars) {
                Some(rewritten) => {
                    debug!(original = raw_query, %rewritten, "query rewritten");
                    return StageOutput::clean(rewritten);
                }
                None => format!("degenerate rewrite: {:?}", answer),
            },
            Err(e) => e.to_string(),
        };

        warn!(%reason, "rewrite fell back to normalized query");
        StageOutput::degraded(fallback, Degradation::RewriteFallback { reason })
    }
}

/// Extract the query from a model answer, or `None` if it is degenerate.
///
/// Keeps the first non-blank line, drops a leading "Query:"-style label and
/// wrapping quotes. Degenerate means empty, without any alphanumeric
/// character, or longer than `max_chars`.
pub fn clean_rewrite(answer: &str, max_chars: usize) -> Option<String> {
    let line = answer.lines().map(str::trim).find(|l| !l.is_empty())?;

    let lower = line.to_lowercase();
    let unlabeled = ANSWER_LABELS
        .iter()
        .find(|label| lower.starts_with(*label))
        .and_then(|label| line.get(label.len()..))
        .unwrap_or(line);

    let cleaned = unlabeled.trim().trim_matches(&QUOTES[..]).trim();

    if cleaned.is_empty()
        || !cleaned.chars().any(char::is_alphanumeric)
        || cleaned.chars().count() > max_chars
    {
        return None;
    }
    Some(cleaned.to_string())
}
