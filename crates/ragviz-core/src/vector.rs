//! Vector math: cosine similarity and a deterministic 2D layout projection.
//!
//! Both functions are pure. Only [`cosine_similarity`] is meaningful for
//! ranking; [`project_to_2d`] exists purely to place points on a plot.

use crate::models::Projection2D;

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal, *or* incomparable (see below)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for vectors of different lengths and when either vector
/// has an L2 norm of exactly zero (which includes empty vectors). Use
/// [`try_cosine_similarity`] to tell a length mismatch apart from a real
/// orthogonal score.
///
/// # Formula
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    try_cosine_similarity(a, b).unwrap_or(0.0)
}

/// Like [`cosine_similarity`], but returns `None` when the vectors differ
/// in length.
pub fn try_cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }

    Some((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// Project a vector onto a 2D point for visual layout.
///
/// For component `v` at index `i`:
///
/// ```text
/// x += v · sin(1.1·i + seed) · cos(0.5·i)
/// y += v · cos(1.3·i + seed) · sin(0.8·i)
/// ```
///
/// Same vector and seed always give the same point. This is not distance
/// preserving; never compare projections to judge similarity.
pub fn project_to_2d(vector: &[f32], seed: f64) -> Projection2D {
    let mut x = 0.0f64;
    let mut y = 0.0f64;

    for (i, &v) in vector.iter().enumerate() {
        let i = i as f64;
        let v = f64::from(v);
        x += v * (i * 1.1 + seed).sin() * (i * 0.5).cos();
        y += v * (i * 1.3 + seed).cos() * (i * 0.8).sin();
    }

    Projection2D { x, y }
}
