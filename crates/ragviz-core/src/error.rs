//! Error types for ragviz-core.

use thiserror::Error;

/// Errors raised at the embedding backend boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmbedError {
    /// The backend request failed (network, HTTP status, retries exhausted).
    #[error("embedding backend failed: {0}")]
    Backend(String),
    /// The backend answered without a vector.
    #[error("embedding backend returned an empty vector")]
    EmptyVector,
    /// The backend returned a vector of the wrong length.
    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    /// The vector has a NaN or infinite component.
    #[error("embedding contains non-finite values")]
    NonFinite,
    /// The backend response could not be parsed.
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),
}

/// Errors raised by [`RetrievalPipeline`](crate::pipeline::RetrievalPipeline).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// `query` was called before a successful `index`.
    #[error("index not built: call index() before query()")]
    NotIndexed,
    /// The query text was empty or whitespace only.
    #[error("query must not be empty")]
    EmptyQuery,
    /// The live backend could not embed the query.
    #[error("failed to embed query: {0}")]
    QueryEmbedding(#[source] EmbedError),
    /// The provider returned a different number of vectors than chunks.
    #[error("embedding batch returned {actual} vectors for {expected} chunks")]
    BatchSizeMismatch { expected: usize, actual: usize },
    /// Chunk vectors in one index disagree on dimensionality.
    #[error("chunk vector has {actual} dimensions, index uses {expected}")]
    InconsistentDimensions { expected: usize, actual: usize },
}
