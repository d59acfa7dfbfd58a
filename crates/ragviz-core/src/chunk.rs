//! Overlapping word-window text chunker.
//!
//! Splits document text into [`Chunk`]s of a fixed number of words, with
//! consecutive windows sharing `overlap` words so context at the seams is
//! not lost.
//!
//! # Algorithm
//!
//! 1. Collapse all whitespace runs and trim, then split into words.
//! 2. Clamp the parameters: size `max(10, chunk_size)`, overlap
//!    `min(size - 1, overlap)`, step `size - overlap` (always ≥ 1).
//! 3. Starting at word 0, take up to `size` words, then advance by `step`.
//! 4. Stop right after the window that reaches the last word.
//! 5. Guarantee at least one chunk (an empty document gives one empty chunk).
//!
//! # Example
//!
//! ```rust
//! use ragviz_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("one two three", 50, 10);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].id, "chunk-1");
//! assert_eq!(chunks[0].span(), 0..3);
//! ```

use serde::Serialize;

use crate::models::Chunk;

/// Smallest window the chunker will use, in words.
pub const MIN_CHUNK_SIZE: usize = 10;

/// Effective (clamped) chunking parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChunkParams {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkParams {
    /// Clamp raw parameters into a usable window. Never fails.
    pub fn clamped(chunk_size: usize, overlap: usize) -> Self {
        let chunk_size = chunk_size.max(MIN_CHUNK_SIZE);
        let overlap = overlap.min(chunk_size - 1);
        Self {
            chunk_size,
            overlap,
        }
    }

    /// Distance between consecutive window starts.
    pub fn step(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Split text into whitespace-normalized words.
///
/// Word indices in [`Chunk::span`] refer to positions in this sequence.
pub fn normalize_words(text: &str) -> Vec<&str> {
    text.split_whitespace().collect()
}

/// Split text into overlapping word windows.
///
/// Output is a pure function of the inputs. Malformed parameters are
/// clamped (see [`ChunkParams::clamped`]), never rejected.
///
/// # Guarantees
///
/// - At least one chunk is always returned (even for empty text).
/// - Ids are sequential: `chunk-1`, `chunk-2`, ….
/// - Every word index falls inside at least one chunk, and the last
///   chunk ends at the total word count.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<Chunk> {
    chunk_words(&normalize_words(text), ChunkParams::clamped(chunk_size, overlap))
}

/// Window an already-normalized word sequence.
pub fn chunk_words(words: &[&str], params: ChunkParams) -> Vec<Chunk> {
    let total = words.len();
    let step = params.step();
    let mut chunks = Vec::with_capacity(total / step + 1);
    let mut start = 0;

    loop {
        let end = (start + params.chunk_size).min(total);
        chunks.push(make_chunk(chunks.len() + 1, words, start, end));
        if end >= total {
            break;
        }
        start += step;
    }

    chunks
}

fn make_chunk(ordinal: usize, words: &[&str], start: usize, end: usize) -> Chunk {
    Chunk {
        id: format!("chunk-{}", ordinal),
        text: words[start..end].join(" "),
        start_word: start,
        end_word: end,
    }
}
