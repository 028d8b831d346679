//! Error types for the retrieval engine.

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval engine.
///
/// Only write failures reach callers. Unreadable caches, snapshots and
/// chapters degrade to empty values with a warning.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Index build or persistence error.
    #[error("index error: {0}")]
    Index(#[from] storyline_index::IndexError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}
