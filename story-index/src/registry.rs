//! Character registry parsing.
//!
//! The registry is a hand-maintained markdown document (the character
//! tracker). Names come from the first cell of table rows and from inline
//! `姓名: X` / `角色：X` declarations.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::storage;
use crate::vocabulary::Vocabulary;

const MIN_NAME_CHARS: usize = 2;
const MAX_NAME_CHARS: usize = 20;
const INLINE_NAME_PATTERN: &str = r"(?:姓名|角色)\s*[:：]\s*([一-鿿A-Za-z0-9_·.]{2,20})";

/// Default number of lines around a hit included in a relation snippet.
pub const SNIPPET_WINDOW: usize = 2;

/// Default cap on relation snippets.
pub const MAX_SNIPPETS: usize = 8;

/// Known entity names plus the document they were parsed from.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    names: Vec<String>,
    lines: Vec<String>,
}

fn is_name_char(c: char) -> bool {
    crate::lexical::is_cjk(c) || c.is_ascii_alphanumeric() || matches!(c, '_' | '·' | '.')
}

fn is_name_candidate(candidate: &str) -> bool {
    let count = candidate.chars().count();
    (MIN_NAME_CHARS..=MAX_NAME_CHARS).contains(&count) && candidate.chars().all(is_name_char)
}

/// Whether a line is a markdown table separator such as `| --- | :-: |`.
pub fn is_table_separator(line: &str) -> bool {
    let Some(rest) = line.trim().strip_prefix('|') else {
        return false;
    };
    let rest = rest.strip_suffix('|').unwrap_or(rest);
    let cells: Vec<&str> = rest.split('|').collect();
    cells.len() >= 2
        && cells.iter().all(|cell| {
            let cell = cell.trim();
            let cell = cell.strip_prefix(':').unwrap_or(cell);
            let cell = cell.strip_suffix(':').unwrap_or(cell);
            !cell.is_empty() && cell.chars().all(|c| c == '-')
        })
}

impl EntityRegistry {
    /// Parse a registry document.
    pub fn parse(text: &str, vocabulary: &Vocabulary) -> Self {
        let noise: HashSet<&str> = vocabulary.registry_noise.iter().map(String::as_str).collect();
        let mut names = BTreeSet::new();

        for line in text.lines() {
            let line = line.trim();
            if !line.starts_with('|') || is_table_separator(line) {
                continue;
            }
            let Some(first_cell) = line.trim_matches('|').split('|').next() else {
                continue;
            };
            let candidate = first_cell.trim();
            if !noise.contains(candidate) && is_name_candidate(candidate) {
                names.insert(candidate.to_string());
            }
        }

        if let Ok(re) = regex_lite::Regex::new(INLINE_NAME_PATTERN) {
            for cap in re.captures_iter(text) {
                if let Some(name) = cap.get(1) {
                    let candidate = name.as_str().trim();
                    if !noise.contains(candidate) {
                        names.insert(candidate.to_string());
                    }
                }
            }
        }

        Self {
            names: names.into_iter().collect(),
            lines: text.lines().map(String::from).collect(),
        }
    }

    /// Load the registry from disk. A missing file is an empty registry.
    pub async fn load(path: &Path, vocabulary: &Vocabulary) -> Self {
        match storage::read_text(path).await {
            Some(text) => {
                let registry = Self::parse(&text, vocabulary);
                debug!("Loaded {} entity names from {}", registry.len(), path.display());
                registry
            }
            None => {
                debug!("No entity registry at {}", path.display());
                Self::default()
            }
        }
    }

    /// Build a registry directly from names (deduplicated and sorted).
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: BTreeSet<String> = names.into_iter().map(Into::into).collect();
        Self {
            names: names.into_iter().collect(),
            lines: Vec::new(),
        }
    }

    /// Sorted, deduplicated names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Hash of the sorted name list. Any change to the name set changes it.
    pub fn signature(&self) -> String {
        let mut hasher = Sha256::new();
        for name in &self.names {
            hasher.update(name.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }

    /// Names that literally occur in `text`, in registry order.
    pub fn entities_in(&self, text: &str) -> Vec<String> {
        self.names
            .iter()
            .filter(|name| text.contains(name.as_str()))
            .cloned()
            .collect()
    }

    /// Windows of registry lines around mentions of `terms`.
    ///
    /// A window never starts inside the previous accepted window, and
    /// windows whose non-separator content was already emitted are skipped.
    pub fn relation_snippets(&self, terms: &[String], window: usize, max_hits: usize) -> Vec<String> {
        if terms.is_empty() || self.lines.is_empty() {
            return Vec::new();
        }

        let mut hits = Vec::new();
        let mut used = HashSet::new();
        let mut seen = HashSet::new();
        let mut last_end: Option<usize> = None;

        for (i, line) in self.lines.iter().enumerate() {
            if !terms.iter().any(|term| line.contains(term.as_str())) {
                continue;
            }
            if last_end.is_some_and(|end| i <= end) {
                continue;
            }

            let start = i.saturating_sub(window);
            let end = (i + window + 1).min(self.lines.len());
            if !used.insert((start, end)) {
                continue;
            }

            let block = self.lines[start..end].join("\n").trim().to_string();
            let normalized = block
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !is_table_separator(l))
                .collect::<Vec<_>>()
                .join(" || ");

            if !block.is_empty() && !normalized.is_empty() && seen.insert(normalized) {
                hits.push(block);
                last_end = Some(end - 1);
            }
            if hits.len() >= max_hits {
                break;
            }
        }

        hits
    }
}
