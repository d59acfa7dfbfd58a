//! `ragviz query`: index a document and rank its chunks against a query.
//!
//! Text output lists the top hits with their score and 2D point. `--json`
//! prints the full visualization payload instead: the index summary plus a
//! [`QueryResult`] holding every chunk, so a front-end can plot all of them.

use anyhow::{bail, Result};
use serde::Serialize;
use std::path::Path;

use ragviz_core::{IndexSummary, QueryResult, RetrievalPipeline};

use crate::config::Config;
use crate::embedding::create_provider;
use crate::input::read_document;

const EXCERPT_CHARS: usize = 120;

/// JSON output of `ragviz query --json`.
#[derive(Serialize)]
struct QueryReport<'a> {
    index: &'a IndexSummary,
    result: &'a QueryResult,
}

#[allow(clippy::too_many_arguments)]
pub async fn run_query(
    config: &Config,
    path: &Path,
    query: &str,
    chunk_size: Option<i64>,
    overlap: Option<i64>,
    seed: Option<f64>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let seed = resolve_seed(config, seed)?;
    let text = read_document(path)?;
    let (chunk_size, overlap) = config.chunking.resolve(chunk_size, overlap);
    let limit = limit.unwrap_or(config.visualization.top_k);

    let provider = create_provider(&config.embedding)?;
    let mut pipeline = RetrievalPipeline::new(provider);
    let summary = pipeline.index(&text, chunk_size, overlap).await?;
    let result = pipeline.query(query, seed).await?;

    if result.has_fallback() {
        eprintln!("{}", fallback_advisory(&summary, &result));
    }

    if json {
        let report = QueryReport {
            index: &summary,
            result: &result,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_result(&summary, &result, limit));
    }

    Ok(())
}

/// `--seed` if given, else `[visualization].seed`. Must be finite.
fn resolve_seed(config: &Config, seed: Option<f64>) -> Result<f64> {
    let seed = seed.unwrap_or(config.visualization.seed);
    if !seed.is_finite() {
        bail!("--seed must be a finite number, got {}", seed);
    }
    Ok(seed)
}

/// Warning shown whenever placeholder vectors took part in a ranking.
pub fn fallback_advisory(summary: &IndexSummary, result: &QueryResult) -> String {
    if result.query_fallback {
        "Note: running with mock embeddings. Scores and positions are random, not semantic. \
         Configure [embedding] provider and its API key for real results."
            .to_string()
    } else {
        format!(
            "Note: {} of {} chunks could not be embedded and use random placeholder vectors; \
             their scores are meaningless.",
            summary.fallback_count, summary.chunk_count
        )
    }
}

/// Human-readable ranking, limited to the first `limit` hits.
pub fn format_result(summary: &IndexSummary, result: &QueryResult, limit: usize) -> String {
    let mut out = format!(
        "Indexed {} chunks ({} words, {} dims, model {})\n",
        summary.chunk_count, summary.total_words, summary.dims, summary.model
    );
    out.push_str(&format!(
        "Query \"{}\" at ({:.3}, {:.3}), seed {}\n\n",
        result.query, result.query_projection.x, result.query_projection.y, result.seed
    ));

    let hits = result.top(limit);
    if hits.is_empty() {
        out.push_str("No results.\n");
        return out;
    }

    for hit in hits {
        let marker = if hit.fallback { " (placeholder)" } else { "" };
        out.push_str(&format!(
            "{}. [{:.2}] {} (words {}..{}){}\n",
            hit.rank, hit.score, hit.chunk.id, hit.chunk.start_word, hit.chunk.end_word, marker
        ));
        out.push_str(&format!(
            "    point: ({:.3}, {:.3})\n",
            hit.projection.x, hit.projection.y
        ));
        out.push_str(&format!("    excerpt: \"{}\"\n\n", excerpt(&hit.chunk.text)));
    }

    if result.hits.len() > hits.len() {
        out.push_str(&format!(
            "({} more chunks not shown, use --limit or --json)\n",
            result.hits.len() - hits.len()
        ));
    }

    out
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_CHARS).collect();
    format!("{}…", cut.trim_end())
}
