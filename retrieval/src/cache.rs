//! Persistent query cache.
//!
//! Keys hash the normalized query, the retrieval parameters and the index
//! signature, so any index change makes every older entry unreachable.
//! Stale entries are only dropped by capacity eviction.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use storyline_index::lexical::normalize_text;
use storyline_index::storage;
use tracing::debug;

use crate::error::Result;
use crate::result::RetrievalResult;
use crate::retriever::RetrievalParams;

/// Default number of cached queries.
pub const DEFAULT_MAX_ENTRIES: usize = 200;

/// A cached result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub saved_at: DateTime<Utc>,
    pub result: RetrievalResult,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CacheFile {
    #[serde(default)]
    entries: BTreeMap<String, CacheEntry>,
}

/// Cache key for a query against a given index.
pub fn cache_key(query: &str, params: &RetrievalParams, index_signature: &str) -> String {
    let raw = format!(
        "{}|{}|{}|{}|{}|{}",
        normalize_text(query),
        params.top_k,
        params.passages_per_chapter,
        params.passage_max_chars,
        params.candidate_k,
        index_signature
    );
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

/// Query results persisted in one JSON file.
pub struct QueryCache {
    path: PathBuf,
    max_entries: usize,
    entries: BTreeMap<String, CacheEntry>,
}

impl QueryCache {
    /// An empty cache backed by `path`.
    pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries,
            entries: BTreeMap::new(),
        }
    }

    /// Load the cache. An absent or malformed file is an empty cache.
    pub async fn load(path: impl AsRef<Path>, max_entries: usize) -> Self {
        let path = path.as_ref();
        let mut cache = Self::new(path, max_entries);
        if let Some(file) = storage::read_json::<CacheFile>(path).await {
            cache.entries = file.entries;
            debug!("Loaded {} cached queries", cache.entries.len());
        }
        cache
    }

    /// Cached result for `key`, marked as a cache hit.
    pub fn get(&self, key: &str) -> Option<RetrievalResult> {
        self.entries.get(key).map(|entry| {
            let mut result = entry.result.clone();
            result.cache_hit = true;
            result
        })
    }

    /// Store a result, evicting the oldest entries over capacity.
    pub fn put(&mut self, key: impl Into<String>, result: RetrievalResult) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                saved_at: Utc::now(),
                result,
            },
        );
        self.evict();
    }

    fn evict(&mut self) {
        while self.entries.len() > self.max_entries {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, entry)| entry.saved_at)
                .map(|(key, _)| key.clone())
            else {
                break;
            };
            debug!("Evicting cached query {oldest}");
            self.entries.remove(&oldest);
        }
    }

    /// Persist the cache atomically.
    pub async fn save(&self) -> Result<()> {
        let file = CacheFile {
            entries: self.entries.clone(),
        };
        storage::write_json(&self.path, &file).await?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn result(query: &str) -> RetrievalResult {
        RetrievalResult {
            query: query.to_string(),
            index_signature: "1-abc".to_string(),
            ..RetrievalResult::default()
        }
    }

    #[test]
    fn test_cache_key_inputs() {
        let params = RetrievalParams::default();
        let key = cache_key("林岚  的秘密", &params, "3-aaaa");
        assert_eq!(key, cache_key("林岚 的秘密", &params, "3-aaaa"));
        assert_ne!(key, cache_key("林岚 的秘密", &params, "3-bbbb"));

        let wider = RetrievalParams {
            candidate_k: 20,
            ..params
        };
        assert_ne!(key, cache_key("林岚 的秘密", &wider, "3-aaaa"));
        assert_eq!(key.len(), 64);
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("query_cache.json");

        let mut cache = QueryCache::load(&path, 10).await;
        assert!(cache.is_empty());
        cache.put("k1", result("林岚"));
        cache.save().await.unwrap();

        let reloaded = QueryCache::load(&path, 10).await;
        let hit = reloaded.get("k1").unwrap();
        assert!(hit.cache_hit);
        assert_eq!(hit.query, "林岚");
        assert!(reloaded.get("missing").is_none());
    }

    #[test]
    fn test_evicts_oldest() {
        let mut cache = QueryCache::new("unused.json", 2);
        cache.put("a", result("a"));
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.put("b", result("b"));
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.put("c", result("c"));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
    }

    #[tokio::test]
    async fn test_malformed_file_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("query_cache.json");
        std::fs::write(&path, "[1, 2, 3]").unwrap();
        assert!(QueryCache::load(&path, 10).await.is_empty());

        std::fs::write(&path, "not json").unwrap();
        assert!(QueryCache::load(&path, 10).await.is_empty());
    }
}
