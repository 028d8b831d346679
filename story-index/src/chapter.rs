//! Per-chapter metadata document.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// File-name patterns carrying the chapter ordinal, tried in order.
const ORDINAL_PATTERNS: &[&str] = &[
    r"第(\d+)章",
    r"(?i)(?:^|[^A-Za-z])ch(?:apter)?[\s_\-]*(\d+)",
];

/// Suffix of sidecar metadata files.
pub const META_SUFFIX: &str = ".meta.json";

/// Hex characters of the file-name digest appended to sidecar slugs.
const META_HASH_CHARS: usize = 8;

/// Coarse conflict intensity of a chapter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictLevel {
    High,
    Medium,
    Low,
    #[default]
    Unknown,
}

impl ConflictLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Unknown => "unknown",
        }
    }

    /// Whether the fine ranker grants the tension bonus.
    pub fn is_tense(self) -> bool {
        matches!(self, Self::High | Self::Medium)
    }
}

impl std::fmt::Display for ConflictLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chapter ordinal encoded in a file name, or 0 when there is none.
pub fn parse_chapter_no(file_name: &str) -> u32 {
    for pattern in ORDINAL_PATTERNS {
        if let Ok(re) = regex_lite::Regex::new(pattern) {
            if let Some(number) = re
                .captures(file_name)
                .and_then(|cap| cap.get(1))
                .and_then(|m| m.as_str().parse().ok())
            {
                return number;
            }
        }
    }
    0
}

/// Sidecar file name for a chapter file.
///
/// The readable slug is lossy, so a digest of the exact file name keeps
/// names like `第1章 旧港.md` and `第1章_旧港.md` apart.
pub fn meta_file_name(chapter_file: &str) -> String {
    let slug: String = chapter_file
        .chars()
        .map(|c| {
            if crate::lexical::is_cjk(c) || c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let digest = format!("{:x}", Sha256::digest(chapter_file.as_bytes()));
    format!("{slug}_{}{META_SUFFIX}", &digest[..META_HASH_CHARS])
}

/// Derived metadata for one chapter file.
///
/// The file name, ordinal and sidecar name are all derived from the path
/// in [`ChapterDocument::new`], so they cannot drift apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterDocument {
    pub chapter_file: String,
    pub chapter_path: PathBuf,
    pub chapter_no: u32,

    /// Modification time of the source at the last (re)build.
    pub mtime: DateTime<Utc>,

    /// Whitespace-normalized prefix of the text.
    pub summary: String,

    pub keywords: Vec<String>,
    pub entities: Vec<String>,
    pub events: Vec<String>,
    pub locations: Vec<String>,
    pub foreshadowing: Vec<String>,
    pub conflict_level: ConflictLevel,

    /// Sidecar file name inside the index's metadata directory.
    pub meta_file: String,
}

impl ChapterDocument {
    /// Create an untagged document for the chapter at `path`.
    pub fn new(path: impl Into<PathBuf>, mtime: DateTime<Utc>) -> Self {
        let chapter_path = path.into();
        let chapter_file = chapter_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            chapter_no: parse_chapter_no(&chapter_file),
            meta_file: meta_file_name(&chapter_file),
            chapter_file,
            chapter_path,
            mtime,
            summary: String::new(),
            keywords: Vec::new(),
            entities: Vec::new(),
            events: Vec::new(),
            locations: Vec::new(),
            foreshadowing: Vec::new(),
            conflict_level: ConflictLevel::Unknown,
        }
    }

    /// Path of the sidecar inside `meta_dir`.
    pub fn meta_path(&self, meta_dir: &Path) -> PathBuf {
        meta_dir.join(&self.meta_file)
    }

    /// Sort key for persisted order.
    pub fn order_key(&self) -> (u32, &str) {
        (self.chapter_no, self.chapter_file.as_str())
    }
}
