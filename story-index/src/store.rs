//! Incremental index store.
//!
//! `build` walks the manuscript directory, reuses prior documents whose
//! source, entity registry, vocabulary and keyword count are unchanged,
//! rebuilds the rest, prunes
//! orphaned sidecars, and persists the snapshot plus the entity reverse map.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::builder::{ChapterMetadataBuilder, DEFAULT_KEYWORD_TOP_N};
use crate::chapter::{ChapterDocument, META_SUFFIX, parse_chapter_no};
use crate::error::{Result, StorageError};
use crate::layout::ProjectPaths;
use crate::registry::EntityRegistry;
use crate::snapshot::{EntityChapterMap, IndexSnapshot};
use crate::storage;
use crate::vocabulary::Vocabulary;

/// Options for a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildOptions {
    /// Keywords kept per chapter.
    pub keyword_top_n: usize,

    /// Reuse unchanged documents from the prior snapshot.
    pub incremental: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            keyword_top_n: DEFAULT_KEYWORD_TOP_N,
            incremental: true,
        }
    }
}

impl BuildOptions {
    /// Disable reuse of prior documents.
    pub fn full_rebuild(mut self) -> Self {
        self.incremental = false;
        self
    }

    pub fn with_keyword_top_n(mut self, keyword_top_n: usize) -> Self {
        self.keyword_top_n = keyword_top_n;
        self
    }
}

/// A chapter file found on disk.
#[derive(Debug, Clone)]
pub struct ChapterFile {
    pub path: PathBuf,
    pub file_name: String,
    pub chapter_no: u32,
    pub mtime: DateTime<Utc>,
}

/// Reads and writes the index files of one project.
pub struct IndexStore {
    paths: ProjectPaths,
    vocabulary: Vocabulary,
}

impl IndexStore {
    pub fn new(paths: ProjectPaths, vocabulary: Vocabulary) -> Self {
        Self { paths, vocabulary }
    }

    pub fn paths(&self) -> &ProjectPaths {
        &self.paths
    }

    /// Load the entity registry; absent means empty.
    pub async fn load_registry(&self) -> EntityRegistry {
        EntityRegistry::load(&self.paths.registry_file, &self.vocabulary).await
    }

    /// Load the persisted snapshot. Absent or corrupt snapshots are `None`.
    pub async fn load_snapshot(&self) -> Option<IndexSnapshot> {
        storage::read_json(&self.paths.snapshot_file).await
    }

    /// Load the persisted entity reverse map.
    pub async fn load_entity_map(&self) -> Option<EntityChapterMap> {
        storage::read_json(&self.paths.entity_map_file).await
    }

    /// Chapter files sorted by (ordinal, file name). A missing manuscript
    /// directory is an empty corpus.
    pub fn chapter_files(&self) -> Vec<ChapterFile> {
        let walker = WalkDir::new(&self.paths.manuscript_dir)
            .min_depth(1)
            .max_depth(1);

        let mut files: Vec<ChapterFile> = walker
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| self.paths.is_chapter_file(entry.path()))
            .filter_map(|entry| {
                let modified = match entry.metadata().map(|m| m.modified()) {
                    Ok(Ok(modified)) => modified,
                    _ => {
                        warn!("Skipping {}: no modification time", entry.path().display());
                        return None;
                    }
                };
                let file_name = entry.file_name().to_string_lossy().into_owned();
                Some(ChapterFile {
                    chapter_no: parse_chapter_no(&file_name),
                    path: entry.path().to_path_buf(),
                    file_name,
                    mtime: DateTime::<Utc>::from(modified),
                })
            })
            .collect();

        files.sort_by(|a, b| {
            a.chapter_no
                .cmp(&b.chapter_no)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        files
    }

    /// Build or refresh the index.
    pub async fn build(&self, options: BuildOptions) -> Result<IndexSnapshot> {
        let start = Instant::now();
        storage::ensure_dir(&self.paths.meta_dir).await?;

        let registry = self.load_registry().await;
        let entity_signature = registry.signature();
        let vocabulary_signature = self.vocabulary.signature();
        let builder = ChapterMetadataBuilder::new(&self.vocabulary, options.keyword_top_n)?;

        let mut prior_docs: HashMap<String, ChapterDocument> = HashMap::new();
        if options.incremental {
            match self.load_snapshot().await {
                Some(prior)
                    if prior.is_compatible(
                        &entity_signature,
                        &vocabulary_signature,
                        options.keyword_top_n,
                    ) =>
                {
                    prior_docs = prior
                        .docs
                        .into_iter()
                        .map(|doc| (doc.chapter_file.clone(), doc))
                        .collect();
                }
                Some(_) => info!(
                    "Entity registry, vocabulary or keyword settings changed; rebuilding every chapter"
                ),
                None => debug!("No usable prior snapshot; rebuilding every chapter"),
            }
        }

        let mut docs = Vec::new();
        let mut reused_docs = 0;
        let mut rebuilt_docs = 0;
        let mut restored_meta_files = 0;

        for file in self.chapter_files() {
            let reusable = prior_docs
                .remove(&file.file_name)
                .filter(|doc| doc.mtime == file.mtime);

            let doc = match reusable {
                Some(mut doc) => {
                    doc.chapter_path = file.path.clone();
                    reused_docs += 1;
                    let sidecar = doc.meta_path(&self.paths.meta_dir);
                    if fs::try_exists(&sidecar).await.unwrap_or(false) {
                        doc
                    } else {
                        debug!("Restoring missing sidecar for {}", file.file_name);
                        restored_meta_files += 1;
                        self.build_document(&builder, &file, &registry).await?
                    }
                }
                None => {
                    rebuilt_docs += 1;
                    self.build_document(&builder, &file, &registry).await?
                }
            };
            docs.push(doc);
        }

        let mut snapshot = IndexSnapshot::new(docs, entity_signature, options.keyword_top_n)
            .with_vocabulary_signature(vocabulary_signature);
        snapshot.reused_docs = reused_docs;
        snapshot.rebuilt_docs = rebuilt_docs;
        snapshot.restored_meta_files = restored_meta_files;
        snapshot.cleaned_meta_files = self.remove_orphaned_sidecars(&snapshot).await;

        storage::write_json(&self.paths.snapshot_file, &snapshot).await?;
        storage::write_json(
            &self.paths.entity_map_file,
            &snapshot.entity_chapter_map(&registry),
        )
        .await?;

        info!(
            "Indexed {} chapters in {:?} (reused: {}, rebuilt: {}, cleaned: {})",
            snapshot.chapter_count,
            start.elapsed(),
            snapshot.reused_docs,
            snapshot.rebuilt_docs,
            snapshot.cleaned_meta_files
        );
        Ok(snapshot)
    }

    async fn build_document(
        &self,
        builder: &ChapterMetadataBuilder,
        file: &ChapterFile,
        registry: &EntityRegistry,
    ) -> Result<ChapterDocument> {
        let text = match storage::read_text(&file.path).await {
            Some(text) => text,
            None => {
                warn!("Indexing unreadable chapter {} as empty", file.path.display());
                String::new()
            }
        };
        builder
            .build(
                file.path.clone(),
                file.mtime,
                &text,
                registry,
                &self.paths.meta_dir,
            )
            .await
    }

    /// Delete sidecars that no current document references.
    async fn remove_orphaned_sidecars(&self, snapshot: &IndexSnapshot) -> usize {
        let live: HashSet<&str> = snapshot.docs.iter().map(|d| d.meta_file.as_str()).collect();

        let mut entries = match fs::read_dir(&self.paths.meta_dir).await {
            Ok(entries) => entries,
            Err(e) => {
                let err = StorageError::ReadDirectory(format!(
                    "{}: {e}",
                    self.paths.meta_dir.display()
                ));
                warn!("Skipping sidecar cleanup: {err}");
                return 0;
            }
        };

        let mut removed = 0;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(META_SUFFIX) || live.contains(name.as_str()) {
                continue;
            }
            match fs::remove_file(entry.path()).await {
                Ok(()) => {
                    debug!("Removed orphaned sidecar {name}");
                    removed += 1;
                }
                Err(e) => {
                    let err = StorageError::DeleteFile(format!("{name}: {e}"));
                    warn!("Keeping orphaned sidecar: {err}");
                }
            }
        }
        removed
    }
}
