//! # Storyline Index
//!
//! Incrementally maintained metadata index over a directory of chapters.
//!
//! Each chapter file gets a [`ChapterDocument`] holding a summary, top
//! keywords, the registry entities it mentions, event tags, locations,
//! foreshadowing spans and a conflict tier. Documents are persisted as
//! sidecar JSON files plus one [`IndexSnapshot`] that the retriever reads.
//!
//! ## Invalidation
//!
//! A document is reused only while its source mtime, the entity registry
//! signature and the keyword count are unchanged. Any registry change
//! rebuilds the whole corpus.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use storyline_index::{BuildOptions, IndexStore, ProjectPaths, Vocabulary};
//!
//! let store = IndexStore::new(ProjectPaths::for_root("./novel"), Vocabulary::default());
//! let snapshot = store.build(BuildOptions::default()).await?;
//! println!("{} chapters, signature {}", snapshot.chapter_count, snapshot.signature());
//! ```

pub mod builder;
pub mod chapter;
pub mod error;
pub mod extraction;
pub mod layout;
pub mod lexical;
pub mod registry;
pub mod snapshot;
pub mod storage;
pub mod store;
pub mod vocabulary;

pub use builder::{ChapterMetadataBuilder, DEFAULT_KEYWORD_TOP_N};
pub use chapter::{ChapterDocument, ConflictLevel};
pub use error::{IndexError, Result, StorageError};
pub use layout::{ProjectLayout, ProjectPaths};
pub use lexical::Tokenizer;
pub use registry::EntityRegistry;
pub use snapshot::{EntityChapterMap, IndexSnapshot};
pub use store::{BuildOptions, ChapterFile, IndexStore};
pub use vocabulary::Vocabulary;
