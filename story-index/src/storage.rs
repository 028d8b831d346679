//! File persistence helpers shared by the index store and the query cache.
//!
//! Writes go to a sibling temp file that is renamed over the target, so a
//! concurrent reader sees either the old file or the new one. There is no
//! lock: two writers racing on the same project still lose one update.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::{Result, StorageError};

/// Decode bytes as UTF-8, dropping any undecodable sequences.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let mut text = String::with_capacity(bytes.len());
    for chunk in bytes.utf8_chunks() {
        text.push_str(chunk.valid());
    }
    text
}

/// Read a text file best-effort. A missing or unreadable file yields `None`.
pub async fn read_text(path: &Path) -> Option<String> {
    match fs::read(path).await {
        Ok(bytes) => Some(decode_lossy(&bytes)),
        Err(e) => {
            debug!("Could not read {}: {e}", path.display());
            None
        }
    }
}

/// Read and deserialize a JSON file. Absent, unreadable or malformed files
/// yield `None`; only the malformed case is worth a warning.
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let content = fs::read(path).await.ok()?;
    match serde_json::from_slice(&content) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring malformed {}: {e}", path.display());
            None
        }
    }
}

/// Create a directory and its parents.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .await
        .map_err(|e| StorageError::CreateDirectory(format!("{}: {e}", path.display())))?;
    Ok(())
}

/// Write `content` to `path` atomically using a temp file.
pub async fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent).await?;
    }

    let mut temp_name = path.file_name().unwrap_or_default().to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    fs::write(&temp_path, content)
        .await
        .map_err(|e| StorageError::WriteFile(format!("{}: {e}", temp_path.display())))?;

    fs::rename(&temp_path, path)
        .await
        .map_err(|e| StorageError::WriteFile(format!("{}: {e}", path.display())))?;

    debug!("Wrote {}", path.display());
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically.
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &content).await
}
