//! `storyline`: build the chapter index and query plot context.
//!
//! Every command prints one pretty JSON payload on stdout. Logs go to
//! stderr and are filtered with `RUST_LOG` (default `warn`).

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::{Value, json};
use storyline_index::storage;
use storyline_retrieval::{BuildOptions, QueryRequest, StoryRetrieval};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Incremental chapter index and plot-context retrieval", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build or refresh the chapter index.
    Build {
        /// Project root containing the manuscript and character tracker.
        #[arg(long)]
        project_root: PathBuf,

        /// Keywords kept per chapter.
        #[arg(long, default_value_t = storyline_index::DEFAULT_KEYWORD_TOP_N)]
        keyword_top_n: usize,

        /// Rebuild every chapter instead of reusing unchanged ones.
        #[arg(long)]
        full_rebuild: bool,
    },

    /// Retrieve chapters relevant to a new plot beat.
    Query {
        /// Project root containing the manuscript and character tracker.
        #[arg(long)]
        project_root: PathBuf,

        /// Description of the next plot beat.
        #[arg(long)]
        query: String,

        /// Chapters to return.
        #[arg(long)]
        top_k: Option<usize>,

        /// Candidate pool kept after coarse recall.
        #[arg(long)]
        candidate_k: Option<usize>,

        /// Excerpts per chapter.
        #[arg(long)]
        passages_per_chapter: Option<usize>,

        /// Displayed characters per excerpt.
        #[arg(long)]
        passage_max_chars: Option<usize>,

        /// Retrieve every time instead of skipping light scenes.
        #[arg(long)]
        no_conditional: bool,

        /// Retrieve even when the query looks like a light scene.
        #[arg(long)]
        force: bool,

        /// Neither read nor write the query cache.
        #[arg(long)]
        no_cache: bool,

        /// Refresh the index before querying.
        #[arg(long)]
        auto_build: bool,

        /// With a build, rebuild every chapter.
        #[arg(long)]
        full_rebuild: bool,

        /// Also write the JSON payload to this file.
        #[arg(long)]
        emit_json: Option<PathBuf>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn absolute(path: &Path) -> anyhow::Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("cannot resolve project root {}", path.display()))
}

async fn run_build(project_root: &Path, keyword_top_n: usize, full_rebuild: bool) -> anyhow::Result<Value> {
    debug!("Building index under {}", project_root.display());
    let engine = StoryRetrieval::open(project_root).await;
    let mut options = BuildOptions::default().with_keyword_top_n(keyword_top_n);
    if full_rebuild {
        options = options.full_rebuild();
    }
    let snapshot = engine.build(options).await.context("index build failed")?;

    Ok(json!({
        "ok": true,
        "cmd": "build",
        "chapter_count": snapshot.chapter_count,
        "reused_docs": snapshot.reused_docs,
        "rebuilt_docs": snapshot.rebuilt_docs,
        "cleaned_meta_files": snapshot.cleaned_meta_files,
        "restored_meta_files": snapshot.restored_meta_files,
        "index_signature": snapshot.signature(),
        "index_file": engine.paths().snapshot_file,
    }))
}

async fn run_query(project_root: &Path, request: QueryRequest) -> anyhow::Result<Value> {
    debug!("Querying {} for \"{}\"", project_root.display(), request.query);
    let engine = StoryRetrieval::open(project_root).await;
    let outcome = engine.query(&request).await.context("query failed")?;

    Ok(json!({
        "ok": true,
        "cmd": "query",
        "context_file": outcome.context_file,
        "cache_hit": outcome.result.cache_hit,
        "skipped": outcome.result.skipped,
        "result": outcome.result,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let (payload, emit_json) = match cli.command {
        Command::Build {
            project_root,
            keyword_top_n,
            full_rebuild,
        } => {
            let root = absolute(&project_root)?;
            (run_build(&root, keyword_top_n, full_rebuild).await?, None)
        }
        Command::Query {
            project_root,
            query,
            top_k,
            candidate_k,
            passages_per_chapter,
            passage_max_chars,
            no_conditional,
            force,
            no_cache,
            auto_build,
            full_rebuild,
            emit_json,
        } => {
            let root = absolute(&project_root)?;
            let request = QueryRequest {
                query,
                top_k,
                candidate_k,
                passages_per_chapter,
                passage_max_chars,
                conditional: !no_conditional,
                force,
                use_cache: !no_cache,
                auto_build,
                full_rebuild,
            };
            (run_query(&root, request).await?, emit_json)
        }
    };

    let rendered = serde_json::to_string_pretty(&payload)?;
    if let Some(path) = emit_json {
        let path = absolute(&path)?;
        storage::write_atomic(&path, rendered.as_bytes())
            .await
            .with_context(|| format!("cannot write {}", path.display()))?;
    }
    println!("{rendered}");
    Ok(())
}
