//! Core data models used throughout ragviz.
//!
//! These types represent the chunks, embeddings, and query results that flow
//! through the indexing and retrieval pipeline.

use std::ops::Range;

use serde::Serialize;

use crate::chunk::ChunkParams;

/// A contiguous word-range slice of a source document.
///
/// Word offsets index into the whitespace-normalized source text, with
/// `end_word` exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Sequential identifier within one chunking pass (`chunk-1`, `chunk-2`, …).
    pub id: String,
    /// Words of the span joined by single spaces.
    pub text: String,
    pub start_word: usize,
    pub end_word: usize,
}

impl Chunk {
    pub fn word_count(&self) -> usize {
        self.end_word - self.start_word
    }

    /// The source word range covered by this chunk.
    pub fn span(&self) -> Range<usize> {
        self.start_word..self.end_word
    }
}

/// An embedding vector tagged with where it came from.
///
/// Ranking treats both variants the same way. The tag exists so callers can
/// tell a meaningful vector from a pseudo-random placeholder without
/// re-deriving it from configuration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "values", rename_all = "snake_case")]
pub enum Embedding {
    /// Produced by a live embedding backend.
    Real(Vec<f32>),
    /// Pseudo-random stand-in (mock mode or a failed batch item).
    Fallback(Vec<f32>),
}

impl Embedding {
    pub fn vector(&self) -> &[f32] {
        match self {
            Embedding::Real(v) | Embedding::Fallback(v) => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Embedding::Fallback(_))
    }

    pub fn dims(&self) -> usize {
        self.vector().len()
    }

    pub fn into_vector(self) -> Vec<f32> {
        match self {
            Embedding::Real(v) | Embedding::Fallback(v) => v,
        }
    }
}

/// A [`Chunk`] paired with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub embedding: Embedding,
}

/// A 2D point for scatter-plot layout. Never used for similarity.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Projection2D {
    pub x: f64,
    pub y: f64,
}

/// One ranked chunk in a [`QueryResult`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryHit {
    /// 1-based position in the ranking.
    pub rank: usize,
    pub chunk: Chunk,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
    pub projection: Projection2D,
    /// True when the chunk's vector is a fallback placeholder.
    pub fallback: bool,
}

/// Ranked answer to a query, plus everything needed to plot it.
///
/// The query point and every hit share one coordinate space because they
/// were projected with the same `seed`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub query: String,
    pub seed: f64,
    pub query_projection: Projection2D,
    pub query_fallback: bool,
    /// Hits ordered by descending score; ties keep chunk order.
    pub hits: Vec<QueryHit>,
}

impl QueryResult {
    /// The first `k` hits.
    pub fn top(&self, k: usize) -> &[QueryHit] {
        &self.hits[..k.min(self.hits.len())]
    }

    /// True when any vector behind this result is a placeholder, in which
    /// case scores carry no meaning.
    pub fn has_fallback(&self) -> bool {
        self.query_fallback || self.hits.iter().any(|h| h.fallback)
    }
}

/// Outcome of building an index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexSummary {
    pub chunk_count: usize,
    pub total_words: usize,
    pub dims: usize,
    /// Number of chunks whose vector is a fallback placeholder.
    pub fallback_count: usize,
    pub model: String,
    pub params: ChunkParams,
}
