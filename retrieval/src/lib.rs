//! # Storyline Retrieval
//!
//! Answers "which earlier chapters matter for this next plot beat" over an
//! index built by `storyline-index`:
//!
//! - **Trigger**: skips queries that look like light scenes
//! - **Coarse recall**: cheap overlap scoring over every chapter
//! - **Fine rerank**: rescoring of the candidate pool
//! - **Passages**: best excerpts per selected chapter
//! - **Cache**: results keyed by query, parameters and index signature
//!
//! ## Architecture
//!
//! ```text
//! query ──► TriggerClassifier ──skip──► empty result
//!               │
//!               ▼
//!          IndexStore (load or build snapshot)
//!               │
//!               ▼
//!          QueryCache ──hit──► cached result
//!               │
//!               ▼
//!          Retriever (coarse ► fine ► passages)
//!               │
//!               ▼
//!          render ──► index/next_plot_context.md
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storyline_retrieval::{QueryRequest, StoryRetrieval};
//!
//! let engine = StoryRetrieval::open("./novel").await;
//! let outcome = engine.query(&QueryRequest::new("林岚与周野在旧港区决战")).await?;
//! println!("{}", outcome.context_file.display());
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod passage;
pub mod render;
pub mod result;
pub mod retriever;
pub mod trigger;

pub use cache::{QueryCache, cache_key};
pub use config::{LayoutConfig, QueryConfig, StorylineConfig};
pub use engine::{QueryOutcome, QueryRequest, StoryRetrieval, StoryRetrievalBuilder};
pub use error::{Result, RetrievalError};
pub use result::{PassageHit, RankedChapter, RetrievalResult, RetrievalStats, ScoreBreakdown};
pub use retriever::{RetrievalParams, Retriever};
pub use trigger::{TriggerClassifier, TriggerDecision};

// Re-export from dependencies for convenience
pub use storyline_index::{BuildOptions, ChapterDocument, EntityRegistry, IndexSnapshot, Vocabulary};
