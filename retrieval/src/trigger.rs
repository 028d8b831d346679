//! Conditional trigger: whether a query is worth a retrieval pass.

use serde::Serialize;
use storyline_index::lexical::normalize_text;
use storyline_index::{EntityRegistry, Vocabulary};

/// Queries at least this many characters long count as complex plot.
pub const LONG_QUERY_CHARS: usize = 18;

/// Plot keywords quoted in the reasons.
const MAX_REASON_KEYWORDS: usize = 4;

/// Verdict for one query. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDecision {
    pub should_trigger: bool,
    pub entities: Vec<String>,
    pub plot_hits: Vec<String>,
    pub light_hits: Vec<String>,

    /// Characters in the normalized query.
    pub query_length: usize,

    pub reasons: Vec<String>,
}

/// Classifies queries using entity, plot and light-scene vocabularies.
#[derive(Debug, Clone)]
pub struct TriggerClassifier {
    plot_keywords: Vec<String>,
    light_scene_keywords: Vec<String>,
}

impl TriggerClassifier {
    pub fn new(vocabulary: &Vocabulary) -> Self {
        Self {
            plot_keywords: vocabulary.plot_keywords.clone(),
            light_scene_keywords: vocabulary.light_scene_keywords.clone(),
        }
    }

    pub fn classify(&self, query: &str, registry: &EntityRegistry) -> TriggerDecision {
        let normalized = normalize_text(query);
        let entities = registry.entities_in(&normalized);
        let plot_hits = hits(&self.plot_keywords, &normalized);
        let light_hits = hits(&self.light_scene_keywords, &normalized);
        let query_length = normalized.chars().count();
        let long_query = query_length >= LONG_QUERY_CHARS;

        let should_trigger =
            !entities.is_empty() || !plot_hits.is_empty() || (long_query && light_hits.is_empty());

        let mut reasons = Vec::new();
        if !entities.is_empty() {
            reasons.push(format!("matched entities: {}", entities.join(", ")));
        }
        if !plot_hits.is_empty() {
            let quoted: Vec<&str> = plot_hits
                .iter()
                .take(MAX_REASON_KEYWORDS)
                .map(String::as_str)
                .collect();
            reasons.push(format!("matched plot keywords: {}", quoted.join(", ")));
        }
        if long_query && light_hits.is_empty() {
            reasons.push(format!(
                "query is {query_length} characters long; treated as a complex plot beat"
            ));
        }
        if !light_hits.is_empty() && entities.is_empty() && plot_hits.is_empty() {
            reasons.push(format!(
                "only light-scene keywords matched: {}",
                light_hits.join(", ")
            ));
        }
        if reasons.is_empty() {
            reasons.push("no entity or plot keyword matched; retrieval can be skipped".to_string());
        }

        TriggerDecision {
            should_trigger,
            entities,
            plot_hits,
            light_hits,
            query_length,
            reasons,
        }
    }
}

/// Vocabulary terms found in `text`, sorted.
fn hits(terms: &[String], text: &str) -> Vec<String> {
    let mut found: Vec<String> = terms
        .iter()
        .filter(|term| !term.is_empty() && text.contains(term.as_str()))
        .cloned()
        .collect();
    found.sort();
    found.dedup();
    found
}
