//! Two-stage chapter retrieval.
//!
//! Coarse recall scores every document on cheap overlap signals and keeps a
//! bounded candidate pool. Fine rerank rescores only the pool, adding
//! summary overlap, recency and conflict. Excerpts are then selected from
//! the chapter text on disk for each survivor.

use std::collections::HashSet;

use storyline_index::lexical::normalize_text;
use storyline_index::registry::{MAX_SNIPPETS, SNIPPET_WINDOW};
use storyline_index::storage;
use storyline_index::{ChapterDocument, EntityRegistry, IndexSnapshot, Tokenizer, Vocabulary};
use tracing::{debug, warn};

use crate::passage::PassageSelector;
use crate::result::{RankedChapter, RetrievalResult, RetrievalStats, ScoreBreakdown};

/// Bonus added to the fine score of high or medium conflict chapters.
const CONFLICT_BONUS: f64 = 0.2;

/// Per-query retrieval knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalParams {
    /// Chapters returned after rerank.
    pub top_k: usize,

    /// Candidate pool size after coarse recall.
    pub candidate_k: usize,

    pub passages_per_chapter: usize,
    pub passage_max_chars: usize,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            top_k: 4,
            candidate_k: 12,
            passages_per_chapter: 2,
            passage_max_chars: 220,
        }
    }
}

/// Query-side features shared by both stages.
struct QueryFeatures<'a> {
    text: &'a str,
    tokens: HashSet<String>,
    entities: Vec<String>,
}

/// A document moving through the two stages.
///
/// `fine` stays zero until the document survives coarse recall.
struct Scored<'a> {
    doc: &'a ChapterDocument,
    breakdown: ScoreBreakdown,
    coarse: f64,
    fine: f64,
}

/// Two-stage retriever over an [`IndexSnapshot`].
#[derive(Debug, Clone)]
pub struct Retriever {
    tokenizer: Tokenizer,
    selector: PassageSelector,
}

impl Retriever {
    pub fn new(vocabulary: &Vocabulary) -> Self {
        let tokenizer = Tokenizer::new(vocabulary);
        Self {
            selector: PassageSelector::new(tokenizer.clone()),
            tokenizer,
        }
    }

    /// Cheap overlap signals between the query and one document. The
    /// fine-only fields are left at zero.
    fn coarse_breakdown(doc: &ChapterDocument, query: &QueryFeatures<'_>) -> ScoreBreakdown {
        ScoreBreakdown {
            entity_overlap: doc
                .entities
                .iter()
                .filter(|&entity| query.entities.contains(entity))
                .count(),
            event_overlap: count_in_text(&doc.events, query.text),
            location_overlap: count_in_text(&doc.locations, query.text),
            token_overlap: doc
                .keywords
                .iter()
                .filter(|keyword| query.tokens.contains(keyword.as_str()))
                .count(),
            ..ScoreBreakdown::default()
        }
    }

    /// Score every document on the coarse signals and keep at most
    /// `candidate_k`, highest coarse score first.
    fn coarse_pool<'a>(
        docs: &'a [ChapterDocument],
        query: &QueryFeatures<'_>,
        candidate_k: usize,
    ) -> Vec<Scored<'a>> {
        let mut pool: Vec<Scored<'a>> = docs
            .iter()
            .map(|doc| {
                let breakdown = Self::coarse_breakdown(doc, query);
                Scored {
                    doc,
                    coarse: breakdown.coarse_score(),
                    fine: 0.0,
                    breakdown,
                }
            })
            .collect();

        pool.sort_by(|a, b| b.coarse.total_cmp(&a.coarse));
        keep_top(&mut pool, candidate_k, |s| s.coarse);
        pool
    }

    /// Add summary overlap, recency and conflict to the pool, then keep at
    /// most `top_k`, highest fine score first.
    fn rerank<'a>(
        &self,
        mut pool: Vec<Scored<'a>>,
        query: &QueryFeatures<'_>,
        max_no: u32,
        top_k: usize,
    ) -> Vec<Scored<'a>> {
        for scored in &mut pool {
            let doc = scored.doc;
            let summary_tokens = self.tokenizer.token_set(&doc.summary);
            scored.breakdown.summary_token_overlap =
                query.tokens.intersection(&summary_tokens).count();
            scored.breakdown.recency = if max_no > 0 {
                f64::from(doc.chapter_no) / f64::from(max_no)
            } else {
                0.0
            };
            scored.breakdown.conflict_bonus = if doc.conflict_level.is_tense() {
                CONFLICT_BONUS
            } else {
                0.0
            };
            scored.fine = scored.breakdown.fine_score();
        }

        pool.sort_by(|a, b| b.fine.total_cmp(&a.fine));
        keep_top(&mut pool, top_k, |s| s.fine);
        pool
    }

    /// Run both stages and select excerpts.
    pub async fn retrieve(
        &self,
        snapshot: &IndexSnapshot,
        registry: &EntityRegistry,
        query: &str,
        params: RetrievalParams,
    ) -> RetrievalResult {
        let normalized = normalize_text(query);
        let features = QueryFeatures {
            text: &normalized,
            tokens: self.tokenizer.token_set(&normalized),
            entities: registry.entities_in(&normalized),
        };

        let pool = Self::coarse_pool(&snapshot.docs, &features, params.candidate_k);
        let candidate_pool = pool.len();
        let scored = self.rerank(pool, &features, snapshot.max_chapter_no(), params.top_k);

        let mut retrieved = Vec::with_capacity(scored.len());
        for Scored {
            doc,
            breakdown,
            coarse,
            fine,
        } in scored
        {
            let text = match storage::read_text(&doc.chapter_path).await {
                Some(text) => text,
                None => {
                    warn!("Chapter {} is unreadable; no excerpts", doc.chapter_path.display());
                    String::new()
                }
            };
            let passages = self.selector.select(
                &text,
                &features.tokens,
                &features.entities,
                params.passages_per_chapter,
                params.passage_max_chars,
            );

            retrieved.push(RankedChapter {
                score: fine,
                coarse_score: coarse,
                breakdown,
                chapter_file: doc.chapter_file.clone(),
                chapter_path: doc.chapter_path.clone(),
                chapter_no: doc.chapter_no,
                summary: doc.summary.clone(),
                entities: doc.entities.clone(),
                events: doc.events.clone(),
                locations: doc.locations.clone(),
                foreshadowing: doc.foreshadowing.clone(),
                conflict_level: doc.conflict_level,
                passages,
            });
        }

        let stats = RetrievalStats {
            total_docs: snapshot.docs.len(),
            candidate_pool,
            final_count: retrieved.len(),
            excerpt_chars: retrieved
                .iter()
                .flat_map(|chapter| &chapter.passages)
                .map(|passage| passage.text.chars().count())
                .sum(),
        };
        debug!(
            "Retrieved {} of {} candidates from {} chapters",
            stats.final_count, stats.candidate_pool, stats.total_docs
        );

        RetrievalResult {
            query: query.to_string(),
            relation_snippets: registry.relation_snippets(&features.entities, SNIPPET_WINDOW, MAX_SNIPPETS),
            query_entities: features.entities,
            index_signature: snapshot.signature(),
            retrieved,
            stats,
            cache_hit: false,
            skipped: false,
            trigger_reasons: Vec::new(),
        }
    }
}

/// How many of `tags` occur in `text`.
fn count_in_text(tags: &[String], text: &str) -> usize {
    tags.iter()
        .filter(|tag| !tag.is_empty() && text.contains(tag.as_str()))
        .count()
}

/// Keep the positive-scored prefix up to `k`, or the first `k` entries when
/// nothing scored. Expects the list sorted highest first.
fn keep_top<T>(scored: &mut Vec<T>, k: usize, score: impl Fn(&T) -> f64) {
    let positive = scored.iter().take_while(|&entry| score(entry) > 0.0).count();
    scored.truncate(if positive > 0 { positive.min(k) } else { k });
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use storyline_index::ConflictLevel;

    fn doc(name: &str, entities: &[&str], keywords: &[&str]) -> ChapterDocument {
        let mut doc = ChapterDocument::new(format!("/missing/{name}"), Utc::now());
        doc.entities = entities.iter().map(|e| e.to_string()).collect();
        doc.keywords = keywords.iter().map(|k| k.to_string()).collect();
        doc
    }

    fn features<'a>(text: &'a str, entities: &[&str]) -> QueryFeatures<'a> {
        QueryFeatures {
            text,
            tokens: Tokenizer::new(&Vocabulary::default()).token_set(text),
            entities: entities.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn test_coarse_pool_is_bounded_and_ordered() {
        let mut docs = vec![
            doc("第1章.md", &[], &["秘密"]),
            doc("第2章.md", &["林岚"], &["秘密"]),
            doc("第3章.md", &[], &[]),
            doc("第4章.md", &["林岚"], &[]),
            doc("第5章.md", &[], &[]),
        ];
        docs[2].events = vec!["决战".to_string()];
        docs[4].summary = "林岚守着秘密".to_string();
        let query = features("林岚的秘密与决战", &["林岚"]);

        for candidate_k in [0, 1, 2, 3, 10] {
            let pool = Retriever::coarse_pool(&docs, &query, candidate_k);
            assert!(pool.len() <= candidate_k.min(docs.len()));
            assert!(pool.windows(2).all(|pair| pair[0].coarse >= pair[1].coarse));
        }

        let pool = Retriever::coarse_pool(&docs, &query, 10);
        let order: Vec<_> = pool.iter().map(|s| s.doc.chapter_file.as_str()).collect();
        assert_eq!(order, vec!["第2章.md", "第4章.md", "第3章.md", "第1章.md"]);
        let coarse: Vec<f64> = pool.iter().map(|s| s.coarse).collect();
        assert_eq!(coarse, vec![5.0, 4.0, 2.0, 1.0]);

        // Fine-only signals are not computed for the coarse pool.
        for scored in &pool {
            assert_eq!(scored.breakdown.summary_token_overlap, 0);
            assert_eq!(scored.breakdown.recency, 0.0);
            assert_eq!(scored.breakdown.conflict_bonus, 0.0);
            assert_eq!(scored.fine, 0.0);
        }
    }

    #[test]
    fn test_rerank_only_sees_the_pool() {
        let mut docs = vec![doc("第1章.md", &["林岚"], &[]), doc("第2章.md", &[], &[])];
        docs[1].summary = "林岚守着秘密".to_string();
        docs[1].conflict_level = ConflictLevel::High;
        let query = features("林岚的秘密", &["林岚"]);
        let retriever = Retriever::new(&Vocabulary::default());

        let pool = Retriever::coarse_pool(&docs, &query, 12);
        assert_eq!(pool.len(), 1);
        let ranked = retriever.rerank(pool, &query, 2, 4);

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].doc.chapter_file, "第1章.md");
        assert!((ranked[0].breakdown.recency - 0.5).abs() < 1e-9);
        assert!((ranked[0].fine - 3.15).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_empty_corpus() {
        let snapshot = IndexSnapshot::new(Vec::new(), "sig", 20);
        let result = Retriever::new(&Vocabulary::default())
            .retrieve(&snapshot, &EntityRegistry::default(), "林岚", RetrievalParams::default())
            .await;
        assert!(result.retrieved.is_empty());
        assert_eq!(result.stats, RetrievalStats::default());
    }

    #[tokio::test]
    async fn test_entity_overlap_ranks_first() {
        let registry = EntityRegistry::from_names(["林岚", "周野"]);
        let snapshot = IndexSnapshot::new(
            vec![
                doc("第1章.md", &["周野"], &["雨夜"]),
                doc("第2章.md", &["林岚"], &["秘密"]),
                doc("第3章.md", &[], &[]),
            ],
            registry.signature(),
            20,
        );
        let result = Retriever::new(&Vocabulary::default())
            .retrieve(&snapshot, &registry, "林岚的秘密", RetrievalParams::default())
            .await;

        assert_eq!(result.query_entities, vec!["林岚"]);
        assert_eq!(result.retrieved[0].chapter_file, "第2章.md");
        assert_eq!(result.retrieved[0].breakdown.entity_overlap, 1);
        assert_eq!(result.retrieved[0].breakdown.token_overlap, 1);
        assert_eq!(result.stats.candidate_pool, 1);
        assert_eq!(result.stats.final_count, 1);
    }

    #[tokio::test]
    async fn test_fallback_when_nothing_scores() {
        let snapshot = IndexSnapshot::new(
            vec![doc("第1章.md", &[], &[]), doc("第2章.md", &[], &[])],
            "sig",
            20,
        );
        let params = RetrievalParams {
            top_k: 1,
            ..RetrievalParams::default()
        };
        let result = Retriever::new(&Vocabulary::default())
            .retrieve(&snapshot, &EntityRegistry::default(), "zzz", params)
            .await;

        assert_eq!(result.stats.candidate_pool, 2);
        assert_eq!(result.stats.final_count, 1);
        // Recency lifts the later chapter in the fine stage.
        assert_eq!(result.retrieved[0].chapter_file, "第2章.md");
    }

    #[tokio::test]
    async fn test_event_and_location_overlap_use_query_text() {
        let mut tagged = doc("第1章.md", &[], &[]);
        tagged.events = vec!["决战".to_string()];
        tagged.locations = vec!["旧港区站台".to_string(), "医院".to_string()];
        tagged.conflict_level = ConflictLevel::High;
        let snapshot = IndexSnapshot::new(vec![tagged], "sig", 20);

        let result = Retriever::new(&Vocabulary::default())
            .retrieve(
                &snapshot,
                &EntityRegistry::default(),
                "旧港区站台的决战",
                RetrievalParams::default(),
            )
            .await;
        let breakdown = result.retrieved[0].breakdown;
        assert_eq!(breakdown.event_overlap, 1);
        assert_eq!(breakdown.location_overlap, 1);
        assert!((breakdown.conflict_bonus - CONFLICT_BONUS).abs() < 1e-9);
        assert!((result.retrieved[0].coarse_score - 3.5).abs() < 1e-9);
    }
}
