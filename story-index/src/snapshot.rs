//! Persisted index snapshot.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::chapter::ChapterDocument;
use crate::registry::EntityRegistry;

/// Entity name to the chapter files mentioning it, in document order.
pub type EntityChapterMap = BTreeMap<String, Vec<String>>;

/// Hex characters of the digest kept in the index signature.
const SIGNATURE_HEX_CHARS: usize = 16;

/// The whole document collection as last built.
///
/// Documents are kept sorted by (chapter ordinal, file name); this is the
/// only view of the corpus the retriever consults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSnapshot {
    pub generated_at: DateTime<Utc>,
    pub chapter_count: usize,
    pub reused_docs: usize,
    pub rebuilt_docs: usize,
    pub cleaned_meta_files: usize,

    /// Reusable documents whose missing sidecar was rewritten.
    #[serde(default)]
    pub restored_meta_files: usize,

    /// Keyword count the documents were built with.
    #[serde(default)]
    pub keyword_top_n: usize,

    /// Hash of the sorted entity names the documents were tagged with.
    pub entity_signature: String,

    /// Hash of the vocabulary the documents were tagged with.
    #[serde(default)]
    pub vocabulary_signature: String,

    pub docs: Vec<ChapterDocument>,
}

impl IndexSnapshot {
    /// Create a snapshot, putting `docs` into persisted order.
    pub fn new(
        mut docs: Vec<ChapterDocument>,
        entity_signature: impl Into<String>,
        keyword_top_n: usize,
    ) -> Self {
        docs.sort_by(|a, b| a.order_key().cmp(&b.order_key()));
        Self {
            generated_at: Utc::now(),
            chapter_count: docs.len(),
            reused_docs: 0,
            rebuilt_docs: 0,
            cleaned_meta_files: 0,
            restored_meta_files: 0,
            keyword_top_n,
            entity_signature: entity_signature.into(),
            vocabulary_signature: String::new(),
            docs,
        }
    }

    pub fn with_vocabulary_signature(mut self, signature: impl Into<String>) -> Self {
        self.vocabulary_signature = signature.into();
        self
    }

    /// Whether documents in this snapshot were tagged under the given
    /// inputs and may be reused as-is.
    pub fn is_compatible(
        &self,
        entity_signature: &str,
        vocabulary_signature: &str,
        keyword_top_n: usize,
    ) -> bool {
        self.entity_signature == entity_signature
            && self.vocabulary_signature == vocabulary_signature
            && self.keyword_top_n == keyword_top_n
    }

    /// Summary of the document set, their mtimes and every input the
    /// documents were tagged with (entities, vocabulary, keyword count).
    ///
    /// Any rebuild-worthy change yields a new signature, which is what makes
    /// query cache keys disjoint across index versions.
    pub fn signature(&self) -> String {
        let mut hasher = Sha256::new();
        for doc in &self.docs {
            hasher.update(doc.chapter_file.as_bytes());
            hasher.update(b":");
            hasher.update(
                doc.mtime
                    .to_rfc3339_opts(SecondsFormat::Nanos, true)
                    .as_bytes(),
            );
            hasher.update(b"|");
        }
        hasher.update(self.entity_signature.as_bytes());
        hasher.update(b"|");
        hasher.update(self.vocabulary_signature.as_bytes());
        hasher.update(b"|");
        hasher.update(self.keyword_top_n.to_string().as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        format!("{}-{}", self.docs.len(), &digest[..SIGNATURE_HEX_CHARS])
    }

    /// Highest chapter ordinal in the corpus (0 for an empty corpus).
    pub fn max_chapter_no(&self) -> u32 {
        self.docs.iter().map(|d| d.chapter_no).max().unwrap_or(0)
    }

    pub fn get(&self, chapter_file: &str) -> Option<&ChapterDocument> {
        self.docs.iter().find(|d| d.chapter_file == chapter_file)
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Reverse index from entity to chapters. Every registry name is present,
    /// possibly with no chapters.
    pub fn entity_chapter_map(&self, registry: &EntityRegistry) -> EntityChapterMap {
        let mut map: EntityChapterMap = registry
            .names()
            .iter()
            .map(|name| (name.clone(), Vec::new()))
            .collect();
        for doc in &self.docs {
            for entity in &doc.entities {
                map.entry(entity.clone())
                    .or_default()
                    .push(doc.chapter_file.clone());
            }
        }
        map
    }
}
