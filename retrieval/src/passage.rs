//! Passage splitting and excerpt selection within a chapter.

use std::collections::HashSet;

use storyline_index::Tokenizer;
use storyline_index::lexical::{normalize_text, truncate_chars};

use crate::result::PassageHit;

/// Characters a passage may hold before it is split on sentence ends.
pub const PASSAGE_SPLIT_CHARS: usize = 360;

const SENTENCE_TERMINATORS: &[char] = &['。', '！', '？', '!', '?'];
const ELLIPSIS: &str = "...";

/// Split chapter text into passages.
///
/// Paragraphs are separated by blank lines. A paragraph longer than
/// `max_chars` is cut after sentence terminators and the sentences are
/// packed greedily into chunks of at most `max_chars`; a single sentence
/// longer than that stays whole.
pub fn split_passages(text: &str, max_chars: usize) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(current.join("\n").trim().to_string());
    }

    if paragraphs.is_empty() {
        let normalized = normalize_text(text);
        if normalized.is_empty() {
            return Vec::new();
        }
        paragraphs.push(normalized);
    }

    let mut passages = Vec::new();
    for paragraph in paragraphs {
        if paragraph.chars().count() <= max_chars {
            passages.push(paragraph);
            continue;
        }

        let mut buf = String::new();
        let mut buf_chars = 0;
        for sentence in sentences(&paragraph) {
            let sentence_chars = sentence.chars().count();
            if buf_chars + sentence_chars <= max_chars {
                buf.push_str(sentence);
                buf_chars += sentence_chars;
            } else {
                if !buf.is_empty() {
                    passages.push(std::mem::take(&mut buf));
                }
                buf.push_str(sentence);
                buf_chars = sentence_chars;
            }
        }
        if !buf.is_empty() {
            passages.push(buf);
        }
    }
    passages
}

/// Sentences of `paragraph`, each keeping its terminator, trimmed.
fn sentences(paragraph: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    for (idx, c) in paragraph.char_indices() {
        if SENTENCE_TERMINATORS.contains(&c) {
            let end = idx + c.len_utf8();
            pieces.push(&paragraph[start..end]);
            start = end;
        }
    }
    pieces.push(&paragraph[start..]);
    pieces
        .into_iter()
        .map(str::trim)
        .filter(|piece| !piece.is_empty())
        .collect()
}

/// Truncate for display: at most `max_chars` characters, then `...`.
pub fn truncate_passage(passage: &str, max_chars: usize) -> String {
    if passage.chars().count() <= max_chars {
        return passage.to_string();
    }
    format!("{}{ELLIPSIS}", truncate_chars(passage, max_chars).trim_end())
}

/// Scores passages against a query and picks the best excerpts.
#[derive(Debug, Clone)]
pub struct PassageSelector {
    tokenizer: Tokenizer,
}

impl PassageSelector {
    pub fn new(tokenizer: Tokenizer) -> Self {
        Self { tokenizer }
    }

    /// Score one passage: 3 per query entity present plus 1 per shared token.
    pub fn score(
        &self,
        passage: &str,
        query_tokens: &HashSet<String>,
        query_entities: &[String],
    ) -> PassageHit {
        let passage_tokens = self.tokenizer.token_set(passage);
        let token_overlap = query_tokens.intersection(&passage_tokens).count();
        let entity_overlap = query_entities
            .iter()
            .filter(|entity| passage.contains(entity.as_str()))
            .count();

        PassageHit {
            score: 3.0 * entity_overlap as f64 + token_overlap as f64,
            entity_overlap,
            token_overlap,
            text: passage.to_string(),
        }
    }

    /// Top `per_chapter` passages with a positive score, or the first
    /// `per_chapter` passages when none scores.
    pub fn select(
        &self,
        text: &str,
        query_tokens: &HashSet<String>,
        query_entities: &[String],
        per_chapter: usize,
        max_chars: usize,
    ) -> Vec<PassageHit> {
        let mut scored: Vec<PassageHit> = split_passages(text, PASSAGE_SPLIT_CHARS)
            .iter()
            .map(|passage| self.score(passage, query_tokens, query_entities))
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));

        let positive = scored.iter().take_while(|hit| hit.score > 0.0).count();
        let keep = if positive > 0 {
            positive.min(per_chapter)
        } else {
            per_chapter
        };
        scored.truncate(keep);

        for hit in &mut scored {
            hit.text = truncate_passage(&hit.text, max_chars);
        }
        scored
    }
}
