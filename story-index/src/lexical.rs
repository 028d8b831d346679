//! Lexical extraction: CJK n-grams and ASCII words.
//!
//! Without word segmentation, every 2-, 3- and 4-character window of a CJK
//! run is emitted. That buys partial-match recall at the cost of precision;
//! scorers compensate by weighting entity and tag overlap above raw tokens.

use std::collections::{HashMap, HashSet};

use crate::vocabulary::Vocabulary;

const NGRAM_SIZES: [usize; 3] = [2, 3, 4];
const MIN_ASCII_WORD: usize = 3;

/// Whether `c` is in the CJK Unified Ideographs block.
pub fn is_cjk(c: char) -> bool {
    ('\u{4e00}'..='\u{9fff}').contains(&c)
}

/// Collapse every whitespace run to a single space and trim.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Splits text into matchable tokens.
#[derive(Debug, Clone)]
pub struct Tokenizer {
    stopwords: HashSet<String>,
}

impl Tokenizer {
    /// Create a tokenizer using the vocabulary's stopword table.
    pub fn new(vocabulary: &Vocabulary) -> Self {
        Self {
            stopwords: vocabulary.stopwords.iter().cloned().collect(),
        }
    }

    /// Tokenize text. The output is a multiset; callers should not rely on
    /// its order beyond determinism.
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let mut tokens = Vec::new();

        for run in text.split(|c: char| !is_cjk(c)) {
            let chars: Vec<char> = run.chars().collect();
            for size in NGRAM_SIZES {
                if chars.len() < size {
                    continue;
                }
                for window in chars.windows(size) {
                    let gram: String = window.iter().collect();
                    if !self.stopwords.contains(&gram) {
                        tokens.push(gram);
                    }
                }
            }
        }

        tokens.extend(
            text.split(|c: char| !c.is_ascii_alphabetic())
                .filter(|word| word.len() >= MIN_ASCII_WORD)
                .map(str::to_ascii_lowercase),
        );

        tokens
    }

    /// Distinct tokens of `text`.
    pub fn token_set(&self, text: &str) -> HashSet<String> {
        self.tokenize(text).into_iter().collect()
    }
}

/// The `n` most frequent tokens, ties broken by first occurrence.
pub fn top_keywords(tokens: &[String], n: usize) -> Vec<String> {
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, token) in tokens.iter().enumerate() {
        counts.entry(token.as_str()).or_insert((0, position)).0 += 1;
    }

    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.0.cmp(&a.1.0).then(a.1.1.cmp(&b.1.1)));
    ranked
        .into_iter()
        .take(n)
        .map(|(token, _)| token.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn tokenizer() -> Tokenizer {
        Tokenizer::new(&Vocabulary::default())
    }

    #[test]
    fn test_cjk_ngrams() {
        let tokens: HashSet<String> = tokenizer().token_set("林岚回港");
        let expected: HashSet<String> = ["林岚", "岚回", "回港", "林岚回", "岚回港", "林岚回港"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn test_stopwords_filtered() {
        let tokens = tokenizer().tokenize("我们");
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_ascii_words_lowercased() {
        let tokens = tokenizer().tokenize("The AI is on Pier-9, ok");
        assert_eq!(tokens, vec!["the".to_string(), "pier".to_string()]);
    }

    #[test]
    fn test_single_cjk_char_ignored() {
        assert!(tokenizer().tokenize("他 说 好").is_empty());
    }

    #[test]
    fn test_top_keywords_tie_break_first_seen() {
        let tokens: Vec<String> = ["b", "a", "a", "c", "b", "d"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(top_keywords(&tokens, 3), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_normalize_and_truncate() {
        assert_eq!(normalize_text("  夜色\n\n压在　铁轨上 "), "夜色 压在 铁轨上");
        assert_eq!(truncate_chars("旧港区站台", 3), "旧港区");
        assert_eq!(truncate_chars("abc", 10), "abc");
    }
}
