//! Story retrieval engine.

use std::path::{Path, PathBuf};

use storyline_index::{
    BuildOptions, DEFAULT_KEYWORD_TOP_N, IndexSnapshot, IndexStore, ProjectPaths, Vocabulary,
};
use tracing::{debug, info};

use crate::cache::{QueryCache, cache_key};
use crate::config::{QueryConfig, StorylineConfig};
use crate::error::Result;
use crate::render::{render_context, write_context};
use crate::result::RetrievalResult;
use crate::retriever::{RetrievalParams, Retriever};
use crate::trigger::TriggerClassifier;

/// One query and how to run it.
///
/// Unset knobs fall back to the project's `[query]` configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    pub query: String,
    pub top_k: Option<usize>,
    pub candidate_k: Option<usize>,
    pub passages_per_chapter: Option<usize>,
    pub passage_max_chars: Option<usize>,

    /// Let the trigger classifier skip light queries.
    pub conditional: bool,

    /// Retrieve even when the classifier would skip.
    pub force: bool,

    pub use_cache: bool,

    /// Refresh the index before querying.
    pub auto_build: bool,

    /// Rebuild every document when the query builds the index.
    pub full_rebuild: bool,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: None,
            candidate_k: None,
            passages_per_chapter: None,
            passage_max_chars: None,
            conditional: true,
            force: false,
            use_cache: true,
            auto_build: false,
            full_rebuild: false,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }

    pub fn with_candidate_k(mut self, candidate_k: usize) -> Self {
        self.candidate_k = Some(candidate_k);
        self
    }

    pub fn with_passages(mut self, per_chapter: usize, max_chars: usize) -> Self {
        self.passages_per_chapter = Some(per_chapter);
        self.passage_max_chars = Some(max_chars);
        self
    }

    pub fn with_conditional(mut self, conditional: bool) -> Self {
        self.conditional = conditional;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    pub fn with_auto_build(mut self, auto_build: bool) -> Self {
        self.auto_build = auto_build;
        self
    }

    pub fn with_full_rebuild(mut self, full_rebuild: bool) -> Self {
        self.full_rebuild = full_rebuild;
        self
    }

    /// Parameters after applying `defaults` to every unset knob.
    pub fn params(&self, defaults: &QueryConfig) -> RetrievalParams {
        let base = defaults.params();
        RetrievalParams {
            top_k: self.top_k.unwrap_or(base.top_k),
            candidate_k: self.candidate_k.unwrap_or(base.candidate_k),
            passages_per_chapter: self.passages_per_chapter.unwrap_or(base.passages_per_chapter),
            passage_max_chars: self.passage_max_chars.unwrap_or(base.passage_max_chars),
        }
    }
}

/// A finished query.
#[derive(Debug, Clone)]
pub struct QueryOutcome {
    pub result: RetrievalResult,

    /// Where the rendered context document was written.
    pub context_file: PathBuf,
}

/// Entry point for building the index and answering plot queries for one
/// project.
pub struct StoryRetrieval {
    config: StorylineConfig,
    store: IndexStore,
    retriever: Retriever,
    trigger: TriggerClassifier,
}

impl StoryRetrieval {
    /// Create a new engine builder.
    pub fn builder() -> StoryRetrievalBuilder {
        StoryRetrievalBuilder::new()
    }

    /// Open the project at `project_root`, reading `storyline.toml` if present.
    pub async fn open(project_root: impl AsRef<Path>) -> Self {
        let project_root = project_root.as_ref();
        let config = StorylineConfig::load(project_root).await;
        Self::new(project_root, config)
    }

    /// Create an engine with an explicit configuration.
    pub fn new(project_root: impl AsRef<Path>, config: StorylineConfig) -> Self {
        let paths = config.layout.paths.resolve(project_root);
        debug!("Opening project at {}", paths.root.display());
        Self {
            store: IndexStore::new(paths, config.vocabulary.clone()),
            retriever: Retriever::new(&config.vocabulary),
            trigger: TriggerClassifier::new(&config.vocabulary),
            config,
        }
    }

    pub fn config(&self) -> &StorylineConfig {
        &self.config
    }

    pub fn paths(&self) -> &ProjectPaths {
        self.store.paths()
    }

    /// Build or refresh the index.
    pub async fn build(&self, options: BuildOptions) -> Result<IndexSnapshot> {
        Ok(self.store.build(options).await?)
    }

    /// Answer a plot query and write the context document.
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryOutcome> {
        let registry = self.store.load_registry().await;
        let decision = self.trigger.classify(&request.query, &registry);

        if request.conditional && !request.force && !decision.should_trigger {
            info!("Skipping retrieval: {}", decision.reasons.join("; "));
            let result =
                RetrievalResult::skipped(&request.query, decision.entities, decision.reasons);
            return self.finish(result).await;
        }

        let snapshot = self.snapshot_for(request).await?;
        let params = request.params(&self.config.query);

        let key = cache_key(&request.query, &params, &snapshot.signature());
        let mut cache = if request.use_cache {
            Some(QueryCache::load(&self.paths().cache_file, self.config.query.cache_max_entries).await)
        } else {
            None
        };

        if let Some(hit) = cache.as_ref().and_then(|cache| cache.get(&key)) {
            info!("Query cache hit for \"{}\"", request.query);
            return self.finish(hit).await;
        }

        let mut result = self
            .retriever
            .retrieve(&snapshot, &registry, &request.query, params)
            .await;
        result.trigger_reasons = decision.reasons;

        if let Some(cache) = cache.as_mut() {
            cache.put(key, result.clone());
            cache.save().await?;
            debug!("Query cache holds {} entries", cache.len());
        }

        info!(
            "Retrieved {} chapters for \"{}\" ({} candidates)",
            result.stats.final_count, request.query, result.stats.candidate_pool
        );
        self.finish(result).await
    }

    /// The snapshot to query, building it when absent or when asked to.
    async fn snapshot_for(&self, request: &QueryRequest) -> Result<IndexSnapshot> {
        let prior = self.store.load_snapshot().await;
        if !request.auto_build {
            if let Some(snapshot) = prior {
                return Ok(snapshot);
            }
            info!("No index found; building one");
        }

        let keyword_top_n = prior
            .as_ref()
            .map(|snapshot| snapshot.keyword_top_n)
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_KEYWORD_TOP_N);
        let mut options = BuildOptions::default().with_keyword_top_n(keyword_top_n);
        if request.full_rebuild {
            options = options.full_rebuild();
        }
        self.build(options).await
    }

    async fn finish(&self, result: RetrievalResult) -> Result<QueryOutcome> {
        let context_file = self.paths().context_file.clone();
        let markdown = render_context(&result, &self.config.layout.read_first);
        write_context(&context_file, &markdown).await?;
        Ok(QueryOutcome {
            result,
            context_file,
        })
    }
}

/// Builder for [`StoryRetrieval`].
pub struct StoryRetrievalBuilder {
    project_root: PathBuf,
    config: Option<StorylineConfig>,
    query: Option<QueryConfig>,
    vocabulary: Option<Vocabulary>,
}

impl StoryRetrievalBuilder {
    /// Create a new builder rooted at the current directory.
    pub fn new() -> Self {
        Self {
            project_root: PathBuf::from("."),
            config: None,
            query: None,
            vocabulary: None,
        }
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    /// Use this configuration instead of reading `storyline.toml`.
    pub fn with_config(mut self, config: StorylineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Override the query defaults.
    pub fn with_query_config(mut self, query: QueryConfig) -> Self {
        self.query = Some(query);
        self
    }

    /// Override the vocabulary.
    pub fn with_vocabulary(mut self, vocabulary: Vocabulary) -> Self {
        self.vocabulary = Some(vocabulary);
        self
    }

    /// Build the engine.
    pub async fn build(self) -> StoryRetrieval {
        let mut config = match self.config {
            Some(config) => config,
            None => StorylineConfig::load(&self.project_root).await,
        };
        if let Some(query) = self.query {
            config = config.with_query(query);
        }
        if let Some(vocabulary) = self.vocabulary {
            config = config.with_vocabulary(vocabulary);
        }
        StoryRetrieval::new(&self.project_root, config)
    }
}

impl Default for StoryRetrievalBuilder {
    fn default() -> Self {
        Self::new()
    }
}
