//! `ragviz chunk`: show how a document splits into word windows.
//!
//! No embedding happens here, so the command never needs credentials.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;

use ragviz_core::chunk::{chunk_words, normalize_words};
use ragviz_core::{Chunk, ChunkParams};

use crate::config::Config;
use crate::input::read_document;

/// JSON output of `ragviz chunk --json`.
#[derive(Serialize)]
struct ChunkReport<'a> {
    params: ChunkParams,
    total_words: usize,
    chunks: &'a [Chunk],
}

pub fn run_chunk(
    config: &Config,
    path: &Path,
    chunk_size: Option<i64>,
    overlap: Option<i64>,
    json: bool,
) -> Result<()> {
    let text = read_document(path)?;
    let (chunk_size, overlap) = config.chunking.resolve(chunk_size, overlap);

    let params = ChunkParams::clamped(chunk_size, overlap);
    let words = normalize_words(&text);
    let chunks = chunk_words(&words, params);

    if json {
        let report = ChunkReport {
            params,
            total_words: words.len(),
            chunks: &chunks,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_chunks(&chunks, params, words.len()));
    }

    Ok(())
}

/// Human-readable chunk listing.
pub fn format_chunks(chunks: &[Chunk], params: ChunkParams, total_words: usize) -> String {
    let mut out = format!(
        "{} chunks from {} words (size {}, overlap {}, step {})\n\n",
        chunks.len(),
        total_words,
        params.chunk_size,
        params.overlap,
        params.step()
    );

    for chunk in chunks {
        out.push_str(&format!(
            "{} (words {}..{}, {} words)\n",
            chunk.id,
            chunk.start_word,
            chunk.end_word,
            chunk.word_count()
        ));
        out.push_str(&format!("    \"{}\"\n\n", chunk.text));
    }

    out
}
