//! Markdown rendering of a retrieval result.

use std::fmt;
use std::path::{Path, PathBuf};

use storyline_index::storage;

use crate::error::Result;
use crate::result::{RankedChapter, RetrievalResult};

/// The context document for one result.
///
/// `read_first` lists project files the writer should always open before
/// the retrieved chapters.
pub struct ContextDocument<'a> {
    pub result: &'a RetrievalResult,
    pub read_first: &'a [PathBuf],
}

/// Render the context document for `result`.
pub fn render_context(result: &RetrievalResult, read_first: &[PathBuf]) -> String {
    ContextDocument { result, read_first }.to_string()
}

impl fmt::Display for ContextDocument<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.result;
        writeln!(f, "# Plot Context")?;
        writeln!(f)?;
        writeln!(f, "- Query: {}", result.query)?;
        writeln!(f, "- Matched entities: {}", join_or(&result.query_entities, "none"))?;
        if result.cache_hit {
            writeln!(f, "- Cache hit: yes (reused an earlier retrieval)")?;
        }
        if result.skipped {
            writeln!(
                f,
                "- Conditional trigger: skipped ({})",
                result.trigger_reasons.join("; ")
            )?;
        } else if !result.trigger_reasons.is_empty() {
            writeln!(f, "- Trigger: {}", result.trigger_reasons.join("; "))?;
        }

        writeln!(f, "\n## Read First\n")?;
        for path in self.read_first {
            writeln!(f, "- {}", path.display())?;
        }

        if result.skipped {
            writeln!(f, "\n## Retrieval Strategy\n")?;
            writeln!(
                f,
                "- Light scene or too little signal; chapter retrieval was skipped to save context."
            )?;
            return writeln!(f, "- Pass `--force` to retrieve anyway.");
        }

        let stats = &result.stats;
        writeln!(f, "\n## Stats\n")?;
        writeln!(
            f,
            "- Chapters indexed: {}, candidate pool: {}, returned: {}, excerpt chars: {}",
            stats.total_docs, stats.candidate_pool, stats.final_count, stats.excerpt_chars
        )?;

        writeln!(f, "\n## Chapters to Revisit\n")?;
        if result.retrieved.is_empty() {
            writeln!(f, "- No chapters available")?;
        }
        for (rank, chapter) in result.retrieved.iter().enumerate() {
            write_chapter(f, rank + 1, chapter)?;
        }

        writeln!(f, "\n## Relation Snippets\n")?;
        if result.relation_snippets.is_empty() {
            writeln!(f, "- No matches (consider extending the character tracker)")?;
        }
        for (i, snippet) in result.relation_snippets.iter().enumerate() {
            writeln!(f, "### Snippet {}\n\n```\n{snippet}\n```\n", i + 1)?;
        }

        writeln!(f, "\n## Before Writing\n")?;
        writeln!(
            f,
            "1. Read the chapters above and confirm relationships and open foreshadowing."
        )?;
        writeln!(f, "2. Resolve any contradiction before drafting.")?;
        writeln!(f, "3. Run the usual checks after drafting.")
    }
}

fn write_chapter(f: &mut fmt::Formatter<'_>, rank: usize, chapter: &RankedChapter) -> fmt::Result {
    let b = &chapter.breakdown;
    writeln!(
        f,
        "{rank}. `{}` | score={:.3} (coarse {:.3}) | conflict={}",
        chapter.chapter_file, chapter.score, chapter.coarse_score, chapter.conflict_level
    )?;
    writeln!(
        f,
        "   Signals: entity={} event={} location={} token={} summary={} recency={:.3}",
        b.entity_overlap,
        b.event_overlap,
        b.location_overlap,
        b.token_overlap,
        b.summary_token_overlap,
        b.recency
    )?;
    writeln!(f, "   Summary: {}", chapter.summary)?;
    for (label, values) in [
        ("Entities", &chapter.entities),
        ("Events", &chapter.events),
        ("Locations", &chapter.locations),
        ("Foreshadowing", &chapter.foreshadowing),
    ] {
        if !values.is_empty() {
            writeln!(f, "   {label}: {}", values.join(", "))?;
        }
    }
    if !chapter.passages.is_empty() {
        writeln!(f, "   Excerpts:")?;
        for passage in &chapter.passages {
            writeln!(
                f,
                "   - {} (entity={}, token={}, score={:.3})",
                passage.text, passage.entity_overlap, passage.token_overlap, passage.score
            )?;
        }
    }
    Ok(())
}

fn join_or(values: &[String], empty: &str) -> String {
    if values.is_empty() {
        empty.to_string()
    } else {
        values.join(", ")
    }
}

/// Write the rendered document atomically.
pub async fn write_context(path: &Path, markdown: &str) -> Result<()> {
    storage::write_atomic(path, markdown.as_bytes()).await?;
    Ok(())
}
