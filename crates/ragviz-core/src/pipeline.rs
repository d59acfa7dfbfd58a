//! Retrieval pipeline: chunk → embed → rank → project.
//!
//! A [`RetrievalPipeline`] owns one [`EmbeddingProvider`] and at most one
//! built index. It moves through two states:
//!
//! ```text
//!   Empty ──index()──▶ Indexed ──query()──▶ Indexed
//!                        ▲  │
//!                        └──┘ index() rebuilds from scratch
//! ```
//!
//! `index` takes `&mut self` and `query` takes `&self`, so the borrow
//! checker already rules out a query racing a rebuild on the same
//! instance. Callers sharing a pipeline across tasks wrap it in a mutex.
//!
//! Rebuilds are all-or-nothing: the new index is staged and validated
//! before it replaces the old one, so a failed `index` leaves a previously
//! valid index in place.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::chunk::{chunk_words, normalize_words, ChunkParams};
use crate::embedding::EmbeddingProvider;
use crate::error::PipelineError;
use crate::models::{Chunk, EmbeddedChunk, Embedding, IndexSummary, QueryResult};
use crate::search::rank_chunks;
use crate::vector::project_to_2d;

/// Lifecycle state of a [`RetrievalPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Empty,
    Indexed,
}

/// An embedded chunk set built from one corpus with one set of parameters.
#[derive(Debug, Clone)]
struct ChunkIndex {
    params: ChunkParams,
    total_words: usize,
    dims: usize,
    chunks: Vec<EmbeddedChunk>,
}

/// Orchestrates chunking, embedding, ranking, and projection for one corpus.
pub struct RetrievalPipeline {
    provider: EmbeddingProvider,
    index: Option<ChunkIndex>,
}

impl RetrievalPipeline {
    pub fn new(provider: EmbeddingProvider) -> Self {
        Self {
            provider,
            index: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        match self.index {
            Some(_) => PipelineState::Indexed,
            None => PipelineState::Empty,
        }
    }

    pub fn provider(&self) -> &EmbeddingProvider {
        &self.provider
    }

    /// Embedded chunks of the current index (empty before `index`).
    pub fn chunks(&self) -> &[EmbeddedChunk] {
        self.index.as_ref().map(|i| i.chunks.as_slice()).unwrap_or(&[])
    }

    /// Effective parameters the current index was built with.
    pub fn params(&self) -> Option<ChunkParams> {
        self.index.as_ref().map(|i| i.params)
    }

    /// Drop the current index and return to [`PipelineState::Empty`].
    pub fn clear(&mut self) {
        self.index = None;
    }

    /// Chunk `corpus`, embed every chunk in one batch, and replace the index.
    ///
    /// Chunking parameters are clamped, never rejected. Failed batch items
    /// are embedded as fallback vectors (see [`EmbeddingProvider::embed`]);
    /// [`IndexSummary::fallback_count`] reports how many.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedded batch does not line up with the
    /// chunks. The previous index, if any, is kept.
    pub async fn index(
        &mut self,
        corpus: &str,
        chunk_size: usize,
        overlap: usize,
    ) -> Result<IndexSummary, PipelineError> {
        let params = ChunkParams::clamped(chunk_size, overlap);
        let words = normalize_words(corpus);
        let chunks = chunk_words(&words, params);
        debug!(
            chunks = chunks.len(),
            words = words.len(),
            chunk_size = params.chunk_size,
            overlap = params.overlap,
            "chunked corpus"
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.provider.embed(&texts).await;

        let staged = stage_index(params, words.len(), self.provider.dims(), chunks, embeddings);
        self.install(staged)
    }

    /// Swap in a staged index. On error the current index stays live.
    fn install(
        &mut self,
        staged: Result<ChunkIndex, PipelineError>,
    ) -> Result<IndexSummary, PipelineError> {
        let staged = staged?;
        let params = staged.params;
        let summary = IndexSummary {
            chunk_count: staged.chunks.len(),
            total_words: staged.total_words,
            dims: staged.dims,
            fallback_count: staged
                .chunks
                .iter()
                .filter(|ec| ec.embedding.is_fallback())
                .count(),
            model: self.provider.model_name().to_string(),
            params,
        };

        if self.provider.is_mock() {
            warn!("index built with mock embeddings; similarity scores are meaningless");
        } else if summary.fallback_count > 0 {
            warn!(
                fallback = summary.fallback_count,
                total = summary.chunk_count,
                "some chunks use fallback vectors"
            );
        }
        info!(
            chunks = summary.chunk_count,
            dims = summary.dims,
            model = %summary.model,
            "index built"
        );

        self.index = Some(staged);
        Ok(summary)
    }

    /// Rank every indexed chunk against `text` and lay out the results.
    ///
    /// The query vector and all chunk vectors are projected with the same
    /// `seed`. Same index, query, and seed give identical scores and points
    /// (as long as the backend itself is deterministic).
    ///
    /// # Errors
    ///
    /// - [`PipelineError::NotIndexed`] before a successful [`index`](Self::index).
    /// - [`PipelineError::EmptyQuery`] for blank text.
    /// - [`PipelineError::QueryEmbedding`] when the live backend fails.
    pub async fn query(&self, text: &str, seed: f64) -> Result<QueryResult, PipelineError> {
        let index = self.index.as_ref().ok_or(PipelineError::NotIndexed)?;
        if text.trim().is_empty() {
            return Err(PipelineError::EmptyQuery);
        }

        let query_embedding = self
            .provider
            .embed_one(text)
            .await
            .map_err(PipelineError::QueryEmbedding)?;

        let hits = rank_chunks(&index.chunks, query_embedding.vector(), seed);
        debug!(
            hits = hits.len(),
            top = hits.first().map(|h| h.score).unwrap_or_default(),
            "query ranked"
        );

        Ok(QueryResult {
            query: text.to_string(),
            seed,
            query_projection: project_to_2d(query_embedding.vector(), seed),
            query_fallback: query_embedding.is_fallback(),
            hits,
        })
    }
}

/// Pair chunks with embeddings and validate the result before it goes live.
fn stage_index(
    params: ChunkParams,
    total_words: usize,
    dims: usize,
    chunks: Vec<Chunk>,
    embeddings: Vec<Embedding>,
) -> Result<ChunkIndex, PipelineError> {
    if embeddings.len() != chunks.len() {
        return Err(PipelineError::BatchSizeMismatch {
            expected: chunks.len(),
            actual: embeddings.len(),
        });
    }
    if let Some(bad) = embeddings.iter().find(|e| e.dims() != dims) {
        return Err(PipelineError::InconsistentDimensions {
            expected: dims,
            actual: bad.dims(),
        });
    }

    Ok(ChunkIndex {
        params,
        total_words,
        dims,
        chunks: chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding })
            .collect(),
    })
}
