//! Error types for the chapter index.

use thiserror::Error;

/// Result type alias for index operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Errors that can occur while building or persisting the index.
///
/// Read-side problems (missing registry, corrupt snapshot, undecodable
/// chapter bytes) never surface here; they degrade to safe defaults.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A vocabulary table produced an invalid pattern.
    #[error("invalid pattern: {0}")]
    Pattern(String),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to create a storage directory.
    #[error("failed to create directory: {0}")]
    CreateDirectory(String),

    /// Failed to write a file.
    #[error("failed to write file: {0}")]
    WriteFile(String),

    /// Failed to delete a file.
    #[error("failed to delete file: {0}")]
    DeleteFile(String),

    /// Failed to list a directory.
    #[error("failed to read directory: {0}")]
    ReadDirectory(String),
}
