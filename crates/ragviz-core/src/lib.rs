//! # ragviz Core
//!
//! Shared, WASM-safe retrieval logic for ragviz: word-window chunking,
//! vector math, the embedding provider value, and the retrieval pipeline
//! that ties them together.
//!
//! This crate contains no tokio, reqwest, filesystem I/O, or other
//! native-only dependencies. Concrete network backends live in the
//! `ragviz` app crate and plug in through [`embedding::EmbeddingBackend`].
//!
//! ```text
//! corpus ──▶ chunk ──▶ EmbeddingProvider::embed ──▶ ChunkIndex
//!                                                      │
//! query ──▶ EmbeddingProvider::embed_one ──▶ rank_chunks + project_to_2d
//!                                                      │
//!                                                      ▼
//!                                                 QueryResult
//! ```

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod search;
pub mod vector;

pub use chunk::{chunk_text, ChunkParams};
pub use embedding::{EmbeddingBackend, EmbeddingProvider, TokenCount};
pub use error::{EmbedError, PipelineError};
pub use models::{Chunk, EmbeddedChunk, Embedding, IndexSummary, Projection2D, QueryHit, QueryResult};
pub use pipeline::{PipelineState, RetrievalPipeline};
pub use vector::{cosine_similarity, project_to_2d, try_cosine_similarity};
