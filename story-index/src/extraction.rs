//! Pattern-based tagging of chapter text.
//!
//! Each extractor is a pure function of the text and a vocabulary table:
//! plot events, places, foreshadowing spans and a coarse conflict tier.

use std::collections::HashMap;

use regex_lite::Regex;

use crate::chapter::ConflictLevel;
use crate::error::{IndexError, Result};
use crate::vocabulary::Vocabulary;

/// Maximum event tags kept per chapter.
pub const MAX_EVENT_TAGS: usize = 10;

/// Maximum locations kept per chapter.
pub const MAX_LOCATIONS: usize = 6;

/// Maximum foreshadowing snippets kept per chapter.
pub const MAX_FORESHADOWING: usize = 6;

/// Characters a foreshadowing span may extend past its marker.
const FORESHADOW_SPAN_CHARS: usize = 32;

/// Vocabulary terms present in `text`, in vocabulary order, capped.
pub fn event_tags(text: &str, terms: &[String], cap: usize) -> Vec<String> {
    terms
        .iter()
        .filter(|term| text.contains(term.as_str()))
        .take(cap)
        .cloned()
        .collect()
}

/// First matching tier in precedence order high, medium, low.
pub fn classify_conflict(text: &str, vocabulary: &Vocabulary) -> ConflictLevel {
    let tiers = [
        (&vocabulary.conflict_high, ConflictLevel::High),
        (&vocabulary.conflict_medium, ConflictLevel::Medium),
        (&vocabulary.conflict_low, ConflictLevel::Low),
    ];
    tiers
        .into_iter()
        .find(|(terms, _)| terms.iter().any(|term| text.contains(term.as_str())))
        .map_or(ConflictLevel::Unknown, |(_, level)| level)
}

/// Rank candidates by frequency, ties by first occurrence.
fn rank_by_frequency(candidates: Vec<String>, cap: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (position, candidate) in candidates.into_iter().enumerate() {
        counts.entry(candidate).or_insert((0, position)).0 += 1;
    }
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
    ranked.into_iter().take(cap).map(|(name, _)| name).collect()
}

/// Alternation of escaped terms, longest first so "回到" wins over "到".
fn alternation(terms: &[String]) -> String {
    let mut sorted: Vec<&String> = terms.iter().filter(|t| !t.is_empty()).collect();
    sorted.sort_by_key(|t| std::cmp::Reverse(t.chars().count()));
    sorted
        .into_iter()
        .map(|t| regex_lite::escape(t))
        .collect::<Vec<_>>()
        .join("|")
}

fn compile(pattern: &str) -> Result<Regex> {
    Regex::new(pattern).map_err(|e| IndexError::Pattern(format!("{pattern}: {e}")))
}

/// Regex-backed extractors compiled once from a vocabulary.
#[derive(Debug, Clone)]
pub struct TagExtractor {
    vocabulary: Vocabulary,
    place_after_preposition: Option<Regex>,
    place_bare: Option<Regex>,
    foreshadow: Option<Regex>,
}

impl TagExtractor {
    /// Compile the patterns for `vocabulary`. Empty tables disable the
    /// corresponding extractor.
    pub fn new(vocabulary: &Vocabulary) -> Result<Self> {
        let prepositions = alternation(&vocabulary.place_prepositions);
        let suffixes = alternation(&vocabulary.place_suffixes);
        let markers = alternation(&vocabulary.foreshadow_markers);

        let place_after_preposition = if prepositions.is_empty() || suffixes.is_empty() {
            None
        } else {
            Some(compile(&format!(
                "(?:{prepositions})([一-鿿]{{2,12}}(?:{suffixes}))"
            ))?)
        };
        let place_bare = if suffixes.is_empty() {
            None
        } else {
            Some(compile(&format!("[一-鿿]{{2,8}}(?:{suffixes})"))?)
        };
        let foreshadow = if markers.is_empty() {
            None
        } else {
            Some(compile(&format!(
                "(?:{markers})[^。！？!?\n]{{0,{FORESHADOW_SPAN_CHARS}}}"
            ))?)
        };

        Ok(Self {
            vocabulary: vocabulary.clone(),
            place_after_preposition,
            place_bare,
            foreshadow,
        })
    }

    /// Plot-significant event tags present in the text.
    pub fn events(&self, text: &str) -> Vec<String> {
        event_tags(text, &self.vocabulary.plot_keywords, MAX_EVENT_TAGS)
    }

    /// Place mentions, most frequent first.
    pub fn locations(&self, text: &str) -> Vec<String> {
        let mut candidates = Vec::new();
        if let Some(re) = &self.place_after_preposition {
            candidates.extend(
                re.captures_iter(text)
                    .filter_map(|cap| cap.get(1))
                    .map(|m| m.as_str().to_string()),
            );
        }
        if let Some(re) = &self.place_bare {
            candidates.extend(re.find_iter(text).map(|m| m.as_str().to_string()));
        }
        rank_by_frequency(candidates, MAX_LOCATIONS)
    }

    /// Spans opened by a foreshadowing marker, deduplicated.
    pub fn foreshadowing(&self, text: &str) -> Vec<String> {
        let Some(re) = &self.foreshadow else {
            return Vec::new();
        };
        let mut spans: Vec<String> = Vec::new();
        for m in re.find_iter(text) {
            let span = m.as_str().trim().to_string();
            if !span.is_empty() && !spans.contains(&span) {
                spans.push(span);
            }
            if spans.len() >= MAX_FORESHADOWING {
                break;
            }
        }
        spans
    }

    /// Conflict tier of the text.
    pub fn conflict_level(&self, text: &str) -> ConflictLevel {
        classify_conflict(text, &self.vocabulary)
    }
}
