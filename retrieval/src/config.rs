//! Configuration for the retrieval engine.
//!
//! Read from an optional `storyline.toml` at the project root. Every section
//! and field is optional; a missing file means defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use storyline_index::{ProjectLayout, Vocabulary};
use tracing::{debug, warn};

use crate::error::{Result, RetrievalError};
use crate::retriever::RetrievalParams;

/// File name of the project configuration.
pub const CONFIG_FILE_NAME: &str = "storyline.toml";

/// Configuration for one project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorylineConfig {
    /// File locations plus the render-time reading list.
    pub layout: LayoutConfig,

    /// Query defaults.
    pub query: QueryConfig,

    /// Word tables.
    pub vocabulary: Vocabulary,
}

impl StorylineConfig {
    /// Parse a configuration document.
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| RetrievalError::Config(e.to_string()))
    }

    /// Load `storyline.toml` from `project_root`.
    ///
    /// A missing file means defaults. A malformed one is logged and also
    /// falls back to defaults.
    pub async fn load(project_root: &Path) -> Self {
        let path = project_root.join(CONFIG_FILE_NAME);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(_) => {
                debug!("No {CONFIG_FILE_NAME} in {}; using defaults", project_root.display());
                return Self::default();
            }
        };
        match Self::from_toml(&text) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring malformed {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Set the query configuration.
    pub fn with_query(mut self, query: QueryConfig) -> Self {
        self.query = query;
        self
    }

    /// Set the vocabulary.
    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = vocabulary;
        self
    }
}

/// The `[layout]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    #[serde(flatten)]
    pub paths: ProjectLayout,

    /// Project-relative files always listed first in the rendered context.
    pub read_first: Vec<PathBuf>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            paths: ProjectLayout::default(),
            read_first: vec![
                PathBuf::from("00_memory/novel_plan.md"),
                PathBuf::from("00_memory/novel_state.md"),
            ],
        }
    }
}

/// The `[query]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Chapters returned after rerank.
    pub top_k: usize,

    /// Candidate pool kept after coarse recall.
    pub candidate_k: usize,

    /// Excerpts returned per chapter.
    pub passages_per_chapter: usize,

    /// Displayed characters per excerpt.
    pub passage_max_chars: usize,

    /// Entries kept in the query cache.
    pub cache_max_entries: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        let params = RetrievalParams::default();
        Self {
            top_k: params.top_k,
            candidate_k: params.candidate_k,
            passages_per_chapter: params.passages_per_chapter,
            passage_max_chars: params.passage_max_chars,
            cache_max_entries: crate::cache::DEFAULT_MAX_ENTRIES,
        }
    }
}

impl QueryConfig {
    /// Retrieval parameters with these defaults.
    pub fn params(&self) -> RetrievalParams {
        RetrievalParams {
            top_k: self.top_k,
            candidate_k: self.candidate_k,
            passages_per_chapter: self.passages_per_chapter,
            passage_max_chars: self.passage_max_chars,
        }
    }
}
