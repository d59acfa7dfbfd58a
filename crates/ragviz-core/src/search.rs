//! Brute-force similarity ranking over an in-memory chunk set.
//!
//! Every stored chunk is scored against the query vector with
//! [`cosine_similarity`]; there is no approximate index. Chunk sets are
//! demo-sized, so a linear scan is the whole algorithm.

use crate::models::{EmbeddedChunk, QueryHit};
use crate::vector::{cosine_similarity, project_to_2d};

/// Score, sort, and project every chunk against `query_vector`.
///
/// Hits are ordered by descending score. The sort is stable, so chunks
/// with equal scores keep their original order. Each chunk is projected
/// with `seed` so the hits share a layout with the query point.
pub fn rank_chunks(chunks: &[EmbeddedChunk], query_vector: &[f32], seed: f64) -> Vec<QueryHit> {
    let mut scored: Vec<(f32, &EmbeddedChunk)> = chunks
        .iter()
        .map(|ec| (cosine_similarity(query_vector, ec.embedding.vector()), ec))
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (score, ec))| QueryHit {
            rank: i + 1,
            chunk: ec.chunk.clone(),
            score,
            projection: project_to_2d(ec.embedding.vector(), seed),
            fallback: ec.embedding.is_fallback(),
        })
        .collect()
}
