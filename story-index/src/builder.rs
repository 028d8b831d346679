//! Chapter metadata builder.
//!
//! Turns chapter text into a [`ChapterDocument`] and writes its sidecar.
//! The sidecar write is the only durable effect.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::chapter::ChapterDocument;
use crate::error::Result;
use crate::extraction::TagExtractor;
use crate::lexical::{Tokenizer, normalize_text, top_keywords, truncate_chars};
use crate::registry::EntityRegistry;
use crate::storage;
use crate::vocabulary::Vocabulary;

/// Characters of normalized text kept as the summary.
pub const SUMMARY_CHARS: usize = 260;

/// Default number of keywords kept per chapter.
pub const DEFAULT_KEYWORD_TOP_N: usize = 20;

/// Derives chapter metadata from text.
#[derive(Debug, Clone)]
pub struct ChapterMetadataBuilder {
    tokenizer: Tokenizer,
    extractor: TagExtractor,
    keyword_top_n: usize,
}

impl ChapterMetadataBuilder {
    /// Create a builder for the given vocabulary.
    pub fn new(vocabulary: &Vocabulary, keyword_top_n: usize) -> Result<Self> {
        Ok(Self {
            tokenizer: Tokenizer::new(vocabulary),
            extractor: TagExtractor::new(vocabulary)?,
            keyword_top_n,
        })
    }

    pub fn keyword_top_n(&self) -> usize {
        self.keyword_top_n
    }

    /// Compute every derived field without touching disk.
    pub fn analyze(
        &self,
        path: impl Into<PathBuf>,
        mtime: DateTime<Utc>,
        text: &str,
        registry: &EntityRegistry,
    ) -> ChapterDocument {
        let mut doc = ChapterDocument::new(path, mtime);

        doc.summary = truncate_chars(&normalize_text(text), SUMMARY_CHARS).to_string();
        doc.keywords = top_keywords(&self.tokenizer.tokenize(text), self.keyword_top_n);
        doc.entities = registry.entities_in(text);
        doc.events = self.extractor.events(text);
        doc.locations = self.extractor.locations(text);
        doc.foreshadowing = self.extractor.foreshadowing(text);
        doc.conflict_level = self.extractor.conflict_level(text);

        doc
    }

    /// Analyze the chapter and persist its sidecar under `meta_dir`.
    pub async fn build(
        &self,
        path: impl Into<PathBuf>,
        mtime: DateTime<Utc>,
        text: &str,
        registry: &EntityRegistry,
        meta_dir: &Path,
    ) -> Result<ChapterDocument> {
        let doc = self.analyze(path, mtime, text, registry);
        storage::write_json(&doc.meta_path(meta_dir), &doc).await?;
        debug!(
            "Built metadata for {} ({} keywords, {} entities, conflict {})",
            doc.chapter_file,
            doc.keywords.len(),
            doc.entities.len(),
            doc.conflict_level
        );
        Ok(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapter::ConflictLevel;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const CHAPTER: &str = "林岚来到旧港区站台，周野在雨里等她。\n\n\
        两人对峙良久，林岚终于交出名单：七个代号与一组坐标。\n\n\
        远处传来爆炸声，决战一触即发。";

    fn builder() -> ChapterMetadataBuilder {
        ChapterMetadataBuilder::new(&Vocabulary::default(), DEFAULT_KEYWORD_TOP_N).unwrap()
    }

    #[test]
    fn test_analyze_fills_all_fields() {
        let registry = EntityRegistry::from_names(["林岚", "周野", "沈默"]);
        let doc = builder().analyze("第2章.md", Utc::now(), CHAPTER, &registry);

        assert_eq!(doc.chapter_no, 2);
        assert_eq!(doc.entities, vec!["周野", "林岚"]);
        assert_eq!(doc.events, vec!["决战"]);
        assert_eq!(doc.conflict_level, ConflictLevel::High);
        assert!(doc.locations.iter().any(|l| l == "旧港区站台"));
        assert!(doc.foreshadowing.iter().any(|f| f.starts_with("名单")));
        assert!(doc.keywords.len() <= DEFAULT_KEYWORD_TOP_N);
        assert!(!doc.summary.contains('\n'));
    }

    #[test]
    fn test_summary_is_bounded() {
        let text = "夜".repeat(1000);
        let doc = builder().analyze("第1章.md", Utc::now(), &text, &EntityRegistry::default());
        assert_eq!(doc.summary.chars().count(), SUMMARY_CHARS);
    }

    #[tokio::test]
    async fn test_build_writes_sidecar() {
        let temp_dir = TempDir::new().unwrap();
        let doc = builder()
            .build("第2章.md", Utc::now(), CHAPTER, &EntityRegistry::default(), temp_dir.path())
            .await
            .unwrap();

        let sidecar = doc.meta_path(temp_dir.path());
        assert!(sidecar.exists());
        let stored: ChapterDocument =
            serde_json::from_str(&std::fs::read_to_string(sidecar).unwrap()).unwrap();
        assert_eq!(stored, doc);
    }
}
