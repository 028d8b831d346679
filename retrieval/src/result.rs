//! Retrieval result payloads.
//!
//! These are what the cache persists, what the renderer reads and what the
//! CLI prints, so field names are camelCase on the wire.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use storyline_index::ConflictLevel;

/// Per-signal overlap counts behind a chapter's scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    /// Query entities also present in the chapter.
    pub entity_overlap: usize,

    /// Chapter event tags occurring in the query text.
    pub event_overlap: usize,

    /// Chapter locations occurring in the query text.
    pub location_overlap: usize,

    /// Query tokens among the chapter keywords.
    pub token_overlap: usize,

    /// Query tokens among the summary's tokens.
    pub summary_token_overlap: usize,

    /// Chapter ordinal over the highest ordinal, in `[0, 1]`.
    pub recency: f64,

    /// Bonus for high or medium conflict chapters.
    pub conflict_bonus: f64,
}

impl ScoreBreakdown {
    /// First-stage recall score.
    pub fn coarse_score(&self) -> f64 {
        4.0 * self.entity_overlap as f64
            + 2.0 * self.event_overlap as f64
            + 1.5 * self.location_overlap as f64
            + self.token_overlap as f64
    }

    /// Second-stage rerank score.
    pub fn fine_score(&self) -> f64 {
        3.0 * self.entity_overlap as f64
            + 1.8 * self.event_overlap as f64
            + self.token_overlap as f64
            + 0.6 * self.summary_token_overlap as f64
            + 0.3 * self.recency
            + self.conflict_bonus
    }
}

/// An excerpt selected from a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassageHit {
    pub score: f64,
    pub entity_overlap: usize,
    pub token_overlap: usize,

    /// Display text, truncated with `...` when over the character limit.
    pub text: String,
}

/// A chapter selected by the reranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedChapter {
    /// Fine score; the list is ordered by it.
    pub score: f64,
    pub coarse_score: f64,
    pub breakdown: ScoreBreakdown,
    pub chapter_file: String,
    pub chapter_path: PathBuf,
    pub chapter_no: u32,
    pub summary: String,
    pub entities: Vec<String>,
    pub events: Vec<String>,
    pub locations: Vec<String>,
    pub foreshadowing: Vec<String>,
    pub conflict_level: ConflictLevel,
    pub passages: Vec<PassageHit>,
}

/// Sizes of each retrieval stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalStats {
    pub total_docs: usize,
    pub candidate_pool: usize,
    pub final_count: usize,

    /// Characters across every returned excerpt.
    pub excerpt_chars: usize,
}

/// Outcome of one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalResult {
    pub query: String,
    pub query_entities: Vec<String>,

    /// Signature of the index the result was computed from. Empty when
    /// retrieval was skipped.
    pub index_signature: String,

    pub retrieved: Vec<RankedChapter>,
    pub relation_snippets: Vec<String>,
    pub stats: RetrievalStats,
    pub cache_hit: bool,
    pub skipped: bool,
    pub trigger_reasons: Vec<String>,
}

impl RetrievalResult {
    /// Well-formed empty result for a query the trigger declined.
    pub fn skipped(
        query: impl Into<String>,
        query_entities: Vec<String>,
        trigger_reasons: Vec<String>,
    ) -> Self {
        Self {
            query: query.into(),
            query_entities,
            skipped: true,
            trigger_reasons,
            ..Self::default()
        }
    }
}
