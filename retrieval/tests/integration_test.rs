//! Integration tests for index building and plot retrieval.
//!
//! Each test copies the fixture project into a temp directory, since builds
//! and queries write into the project's index directory.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use pretty_assertions::assert_eq;
use storyline_retrieval::{BuildOptions, QueryRequest, StoryRetrieval};
use tempfile::TempDir;

/// Get the path to the test fixtures directory.
fn fixtures_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures")
}

fn copy_dir(from: &Path, to: &Path) {
    std::fs::create_dir_all(to).unwrap();
    for entry in std::fs::read_dir(from).unwrap() {
        let entry = entry.unwrap();
        let target = to.join(entry.file_name());
        if entry.file_type().unwrap().is_dir() {
            copy_dir(&entry.path(), &target);
        } else {
            std::fs::copy(entry.path(), &target).unwrap();
        }
    }
}

fn fixture_project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    copy_dir(&fixtures_dir().join("novel"), temp_dir.path());
    temp_dir
}

fn touch(path: &Path) {
    let file = std::fs::File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(300))
        .unwrap();
}

#[tokio::test]
async fn test_build_is_idempotent() {
    let project = fixture_project();
    let engine = StoryRetrieval::open(project.path()).await;

    let first = engine.build(BuildOptions::default()).await.unwrap();
    assert_eq!(first.chapter_count, 5);
    assert_eq!(first.rebuilt_docs, 5);

    let second = engine.build(BuildOptions::default()).await.unwrap();
    assert_eq!(second.chapter_count, 5);
    assert_eq!(second.rebuilt_docs, 0);
    assert_eq!(second.reused_docs, 5);
    assert_eq!(second.signature(), first.signature());

    let ordinals: Vec<u32> = second.docs.iter().map(|d| d.chapter_no).collect();
    assert_eq!(ordinals, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_touched_chapter_is_the_only_rebuild() {
    let project = fixture_project();
    let engine = StoryRetrieval::open(project.path()).await;
    let first = engine.build(BuildOptions::default()).await.unwrap();

    touch(&project.path().join("03_manuscript/第2章_雨夜.md"));
    let second = engine.build(BuildOptions::default()).await.unwrap();

    assert_eq!(second.rebuilt_docs, 1);
    assert_eq!(second.reused_docs, 4);
    assert_ne!(second.signature(), first.signature());
}

#[tokio::test]
async fn test_registry_change_rebuilds_every_chapter() {
    let project = fixture_project();
    let engine = StoryRetrieval::open(project.path()).await;
    engine.build(BuildOptions::default()).await.unwrap();

    let tracker = project.path().join("00_memory/character_tracker.md");
    let mut text = std::fs::read_to_string(&tracker).unwrap();
    text.push_str("\n姓名: 老陈\n");
    std::fs::write(&tracker, text).unwrap();

    let second = engine.build(BuildOptions::default()).await.unwrap();
    assert_eq!(second.rebuilt_docs, 5);
    assert_eq!(second.reused_docs, 0);
}

#[tokio::test]
async fn test_deleted_chapter_sidecar_is_cleaned() {
    let project = fixture_project();
    let engine = StoryRetrieval::open(project.path()).await;
    let first = engine.build(BuildOptions::default()).await.unwrap();

    let removed = first.get("第3章_日常.md").unwrap();
    let sidecar = removed.meta_path(&engine.paths().meta_dir);
    assert!(sidecar.exists());

    std::fs::remove_file(project.path().join("03_manuscript/第3章_日常.md")).unwrap();
    let second = engine.build(BuildOptions::default()).await.unwrap();

    assert_eq!(second.chapter_count, 4);
    assert_eq!(second.cleaned_meta_files, 1);
    assert!(!sidecar.exists());
}

#[tokio::test]
async fn test_second_identical_query_hits_cache() {
    let project = fixture_project();
    let engine = StoryRetrieval::open(project.path()).await;
    let request = QueryRequest::new("林岚与沈默的决战").with_auto_build(true);

    let first = engine.query(&request).await.unwrap();
    assert!(!first.result.cache_hit);
    assert!(!first.result.retrieved.is_empty());

    let second = engine.query(&request).await.unwrap();
    assert!(second.result.cache_hit);
    assert_eq!(second.result.retrieved, first.result.retrieved);
    assert_eq!(second.result.index_signature, first.result.index_signature);
}

#[tokio::test]
async fn test_index_change_invalidates_cache() {
    let project = fixture_project();
    let engine = StoryRetrieval::open(project.path()).await;
    let request = QueryRequest::new("林岚与沈默的决战").with_auto_build(true);
    engine.query(&request).await.unwrap();

    touch(&project.path().join("03_manuscript/第4章_决战.md"));
    let after = engine.query(&request).await.unwrap();
    assert!(!after.result.cache_hit);
}

#[tokio::test]
async fn test_keyword_count_change_invalidates_cache() {
    let temp_dir = TempDir::new().unwrap();
    let manuscript = temp_dir.path().join("03_manuscript");
    std::fs::create_dir_all(&manuscript).unwrap();
    std::fs::write(manuscript.join("第1章.md"), "秘密秘密秘密秘密。旧港。").unwrap();

    let engine = StoryRetrieval::open(temp_dir.path()).await;
    let request = QueryRequest::new("旧港的决战")
        .with_force(true)
        .with_auto_build(true);
    let first = engine.query(&request).await.unwrap().result;
    assert!(!first.cache_hit);
    assert_eq!(first.retrieved[0].breakdown.token_overlap, 1);

    let rebuilt = engine
        .build(BuildOptions::default().with_keyword_top_n(1))
        .await
        .unwrap();
    assert_eq!(rebuilt.rebuilt_docs, 1);
    assert_eq!(rebuilt.docs[0].keywords, vec!["秘密"]);

    let second = engine
        .query(&request.clone().with_auto_build(false))
        .await
        .unwrap()
        .result;
    assert!(!second.cache_hit);
    assert_ne!(second.index_signature, first.index_signature);
    assert_eq!(second.retrieved[0].breakdown.token_overlap, 0);
}

#[tokio::test]
async fn test_disabled_cache_writes_nothing() {
    let project = fixture_project();
    let engine = StoryRetrieval::open(project.path()).await;
    let request = QueryRequest::new("林岚与沈默的决战").with_cache(false);

    let outcome = engine.query(&request).await.unwrap();
    assert!(!outcome.result.cache_hit);
    assert!(!engine.paths().cache_file.exists());
}

#[tokio::test]
async fn test_corrupt_cache_is_replaced() {
    let project = fixture_project();
    let engine = StoryRetrieval::open(project.path()).await;
    engine.build(BuildOptions::default()).await.unwrap();
    std::fs::write(&engine.paths().cache_file, "{\"entries\": 42").unwrap();

    let outcome = engine
        .query(&QueryRequest::new("林岚与沈默的决战"))
        .await
        .unwrap();
    assert!(!outcome.result.cache_hit);

    let cache: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&engine.paths().cache_file).unwrap())
            .unwrap();
    assert_eq!(cache["entries"].as_object().unwrap().len(), 1);
}

#[tokio::test]
async fn test_final_results_come_from_the_candidate_pool() {
    let project = fixture_project();
    let engine = StoryRetrieval::open(project.path()).await;
    engine.build(BuildOptions::default()).await.unwrap();

    let everything = engine
        .query(
            &QueryRequest::new("周野在旧港区站台调查名单")
                .with_top_k(10)
                .with_candidate_k(10)
                .with_cache(false),
        )
        .await
        .unwrap()
        .result;
    let mut coarse: Vec<f64> = everything.retrieved.iter().map(|c| c.coarse_score).collect();
    coarse.sort_by(|a, b| b.total_cmp(a));

    let narrow = engine
        .query(
            &QueryRequest::new("周野在旧港区站台调查名单")
                .with_top_k(1)
                .with_candidate_k(2)
                .with_cache(false),
        )
        .await
        .unwrap()
        .result;

    let stats = narrow.stats;
    assert!(stats.final_count <= stats.candidate_pool);
    assert!(stats.candidate_pool <= 2.min(stats.total_docs));
    assert_eq!(narrow.retrieved.len(), stats.final_count);
    for chapter in &narrow.retrieved {
        assert!(chapter.coarse_score >= coarse[2.min(coarse.len() - 1)]);
    }

    let fine: Vec<f64> = everything.retrieved.iter().map(|c| c.score).collect();
    assert!(fine.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[tokio::test]
async fn test_passages_respect_display_limit() {
    let project = fixture_project();
    let engine = StoryRetrieval::open(project.path()).await;
    let request = QueryRequest::new("林岚翻开名单")
        .with_passages(3, 10)
        .with_auto_build(true);

    let outcome = engine.query(&request).await.unwrap();
    let passages: Vec<_> = outcome
        .result
        .retrieved
        .iter()
        .flat_map(|c| &c.passages)
        .collect();

    assert!(!passages.is_empty());
    for passage in passages {
        assert!(passage.text.chars().count() <= 10 + "...".len());
    }
}

#[tokio::test]
async fn test_trigger_skips_small_talk() {
    let project = fixture_project();
    let engine = StoryRetrieval::open(project.path()).await;

    let outcome = engine.query(&QueryRequest::new("今天天气不错")).await.unwrap();
    assert!(outcome.result.skipped);
    assert!(outcome.result.retrieved.is_empty());
    assert!(!engine.paths().snapshot_file.exists());

    let markdown = std::fs::read_to_string(&outcome.context_file).unwrap();
    assert!(markdown.contains("--force"));
}

#[tokio::test]
async fn test_trigger_runs_on_plot_keyword() {
    let project = fixture_project();
    let engine = StoryRetrieval::open(project.path()).await;

    let outcome = engine.query(&QueryRequest::new("主角与反派决战")).await.unwrap();
    assert!(!outcome.result.skipped);
    assert!(engine.paths().snapshot_file.exists());
}

#[tokio::test]
async fn test_force_overrides_trigger() {
    let project = fixture_project();
    let engine = StoryRetrieval::open(project.path()).await;

    let forced = engine
        .query(&QueryRequest::new("今天天气不错").with_force(true))
        .await
        .unwrap();
    assert!(!forced.result.skipped);
    assert_eq!(forced.result.stats.total_docs, 5);
}

#[tokio::test]
async fn test_entity_overlap_ranks_entity_chapters_first() {
    let project = fixture_project();
    let engine = StoryRetrieval::open(project.path()).await;

    let outcome = engine
        .query(&QueryRequest::new("林岚的秘密").with_top_k(5).with_auto_build(true))
        .await
        .unwrap();
    let result = outcome.result;

    assert_eq!(result.query_entities, vec!["林岚"]);
    let top = &result.retrieved[0];
    assert_eq!(top.chapter_file, "第1章_旧港.md");
    assert!(top.breakdown.entity_overlap > 0);

    let with_entity = |c: &&storyline_retrieval::RankedChapter| c.entities.iter().any(|e| e == "林岚");
    let last_with = result.retrieved.iter().rposition(|c| with_entity(&c));
    let first_without = result.retrieved.iter().position(|c| !with_entity(&c));
    if let (Some(last_with), Some(first_without)) = (last_with, first_without) {
        assert!(last_with < first_without);
    }

    assert!(!result.relation_snippets.is_empty());
    let markdown = std::fs::read_to_string(&outcome.context_file).unwrap();
    assert!(markdown.contains("`第1章_旧港.md`"));
}

#[tokio::test]
async fn test_empty_corpus_returns_no_chapters() {
    let temp_dir = TempDir::new().unwrap();
    let engine = StoryRetrieval::open(temp_dir.path()).await;

    let outcome = engine
        .query(&QueryRequest::new("主角与反派决战"))
        .await
        .unwrap();
    assert!(outcome.result.retrieved.is_empty());
    assert_eq!(outcome.result.stats.total_docs, 0);
    assert_eq!(outcome.result.stats.candidate_pool, 0);
}

#[tokio::test]
async fn test_config_overrides_layout() {
    let project = fixture_project();
    std::fs::rename(
        project.path().join("03_manuscript"),
        project.path().join("chapters"),
    )
    .unwrap();
    std::fs::write(
        project.path().join("storyline.toml"),
        "[layout]\nmanuscript_dir = \"chapters\"\nchapter_extensions = [\"md\"]\n",
    )
    .unwrap();

    let engine = StoryRetrieval::open(project.path()).await;
    let snapshot = engine.build(BuildOptions::default()).await.unwrap();
    assert_eq!(snapshot.chapter_count, 4);
}
