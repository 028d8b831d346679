//! Where a project keeps its chapters, registry and index files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Project-relative locations, overridable from `storyline.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectLayout {
    /// Directory holding one file per chapter.
    pub manuscript_dir: PathBuf,

    /// Character tracker document.
    pub registry_file: PathBuf,

    /// Directory receiving every generated file.
    pub index_dir: PathBuf,

    /// Extensions (without dot) recognized as chapter files.
    pub chapter_extensions: Vec<String>,
}

impl Default for ProjectLayout {
    fn default() -> Self {
        Self {
            manuscript_dir: PathBuf::from("03_manuscript"),
            registry_file: PathBuf::from("00_memory/character_tracker.md"),
            index_dir: PathBuf::from("index"),
            chapter_extensions: vec!["md".to_string(), "txt".to_string()],
        }
    }
}

impl ProjectLayout {
    /// Resolve every location against `root`.
    pub fn resolve(&self, root: impl AsRef<Path>) -> ProjectPaths {
        let root = root.as_ref().to_path_buf();
        let index_dir = root.join(&self.index_dir);
        ProjectPaths {
            manuscript_dir: root.join(&self.manuscript_dir),
            registry_file: root.join(&self.registry_file),
            meta_dir: index_dir.join("chapter_meta"),
            snapshot_file: index_dir.join("story_index.json"),
            entity_map_file: index_dir.join("entity_chapter_map.json"),
            cache_file: index_dir.join("query_cache.json"),
            context_file: index_dir.join("next_plot_context.md"),
            chapter_extensions: self.chapter_extensions.clone(),
            index_dir,
            root,
        }
    }
}

/// Absolute locations for one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub manuscript_dir: PathBuf,
    pub registry_file: PathBuf,
    pub index_dir: PathBuf,
    pub meta_dir: PathBuf,
    pub snapshot_file: PathBuf,
    pub entity_map_file: PathBuf,
    pub cache_file: PathBuf,
    pub context_file: PathBuf,
    pub chapter_extensions: Vec<String>,
}

impl ProjectPaths {
    /// Default layout under `root`.
    pub fn for_root(root: impl AsRef<Path>) -> Self {
        ProjectLayout::default().resolve(root)
    }

    /// Whether `path` has one of the chapter extensions.
    pub fn is_chapter_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                self.chapter_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }
}
