//! Embedding provider value and backend trait.
//!
//! Defines the [`EmbeddingBackend`] trait that all embedding backends
//! implement, and the [`EmbeddingProvider`] value the retrieval pipeline is
//! constructed with. The provider owns the failure policy:
//!
//! - **No backend configured** (mock mode): every vector is a
//!   pseudo-random [`Embedding::Fallback`] of the nominal dimensionality.
//! - **Batch item fails**: that item alone is replaced by a fallback
//!   vector; the rest of the batch is kept.
//! - **Single query fails**: surfaced as an [`EmbedError`], because a
//!   query with a random vector would produce rankings that look real.
//!
//! Concrete network backends (Gemini, OpenAI, Ollama, local) live in the
//! `ragviz` app crate.
//!
//! # Example
//!
//! ```rust
//! use ragviz_core::embedding::{EmbeddingProvider, NOMINAL_DIMS};
//!
//! let provider = EmbeddingProvider::mock(NOMINAL_DIMS).with_fallback_seed(7);
//! assert!(provider.is_mock());
//! assert_eq!(provider.model_name(), "mock");
//! ```

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::EmbedError;
use crate::models::Embedding;

/// Dimensionality of fallback vectors when no backend says otherwise.
pub const NOMINAL_DIMS: usize = 768;

/// Approximate characters-per-token ratio for token estimates.
pub const CHARS_PER_TOKEN: usize = 4;

/// Model name reported in mock mode.
pub const MOCK_MODEL: &str = "mock";

/// Trait for embedding backends.
///
/// Implementations convert text into fixed-length vectors. Every vector a
/// backend returns must have [`dims`](EmbeddingBackend::dims) components;
/// the provider treats anything else as a failed item.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-004"`).
    fn model_name(&self) -> &str;

    /// Returns the embedding vector dimensionality (e.g. `768`).
    fn dims(&self) -> usize;

    /// Embed a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed a batch of texts, one result per input in input order.
    ///
    /// The default issues one [`embed_text`](EmbeddingBackend::embed_text)
    /// call per text, sequentially. Backends with a batch endpoint override
    /// this, but must still report failures per item.
    async fn embed_texts(&self, texts: &[String]) -> Vec<Result<Vec<f32>, EmbedError>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed_text(text).await);
        }
        results
    }

    /// Count tokens for `text`, or `Ok(None)` if the backend cannot.
    async fn count_tokens(&self, _text: &str) -> Result<Option<usize>, EmbedError> {
        Ok(None)
    }
}

/// Uniform pseudo-random vectors in `[-1, 1)`.
///
/// Fallback vectors have the right shape but carry no meaning.
pub struct FallbackVectors {
    rng: Mutex<StdRng>,
}

impl FallbackVectors {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible sequence, for tests and demos.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn generate(&self, dims: usize) -> Vec<f32> {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        (0..dims).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
    }
}

impl Default for FallbackVectors {
    fn default() -> Self {
        Self::from_entropy()
    }
}

/// A token count and where it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "source", content = "tokens", rename_all = "snake_case")]
pub enum TokenCount {
    /// Reported by the backend.
    Provider(usize),
    /// `ceil(chars / 4)` heuristic.
    Estimated(usize),
}

impl TokenCount {
    pub fn value(&self) -> usize {
        match self {
            TokenCount::Provider(n) | TokenCount::Estimated(n) => *n,
        }
    }

    pub fn is_estimate(&self) -> bool {
        matches!(self, TokenCount::Estimated(_))
    }
}

/// Estimate tokens as `ceil(character_count / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// The embedding source a [`RetrievalPipeline`](crate::pipeline::RetrievalPipeline)
/// is constructed with.
///
/// Either wraps a live [`EmbeddingBackend`] or runs in mock mode. Which
/// one is an explicit choice made when the provider is built, not an
/// environment check at call time.
pub struct EmbeddingProvider {
    backend: Option<Box<dyn EmbeddingBackend>>,
    dims: usize,
    fallback: FallbackVectors,
}

impl EmbeddingProvider {
    /// Live provider backed by `backend`.
    pub fn new(backend: Box<dyn EmbeddingBackend>) -> Self {
        let dims = backend.dims();
        Self {
            backend: Some(backend),
            dims,
            fallback: FallbackVectors::default(),
        }
    }

    /// Mock provider: every vector is a fallback of `dims` components.
    pub fn mock(dims: usize) -> Self {
        Self {
            backend: None,
            dims,
            fallback: FallbackVectors::default(),
        }
    }

    /// Make fallback vectors reproducible.
    pub fn with_fallback_seed(mut self, seed: u64) -> Self {
        self.fallback = FallbackVectors::seeded(seed);
        self
    }

    pub fn is_mock(&self) -> bool {
        self.backend.is_none()
    }

    pub fn model_name(&self) -> &str {
        self.backend
            .as_deref()
            .map(|b| b.model_name())
            .unwrap_or(MOCK_MODEL)
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// A fresh fallback vector of this provider's dimensionality.
    pub fn fallback_vector(&self) -> Vec<f32> {
        self.fallback.generate(self.dims)
    }

    /// Embed a batch of texts.
    ///
    /// Always returns exactly one [`Embedding`] per input, in input order.
    /// Items the backend fails on come back as [`Embedding::Fallback`].
    pub async fn embed(&self, texts: &[String]) -> Vec<Embedding> {
        let Some(backend) = self.backend.as_deref() else {
            debug!(count = texts.len(), "mock mode, generating fallback vectors");
            return texts
                .iter()
                .map(|_| Embedding::Fallback(self.fallback_vector()))
                .collect();
        };

        let mut results = backend.embed_texts(texts).await;
        if results.len() != texts.len() {
            warn!(
                expected = texts.len(),
                actual = results.len(),
                "embedding batch returned wrong result count, retrying per item"
            );
            results = Vec::with_capacity(texts.len());
            for text in texts {
                results.push(backend.embed_text(text).await);
            }
        }

        results
            .into_iter()
            .enumerate()
            .map(|(i, result)| match result.and_then(|v| self.check(v)) {
                Ok(v) => Embedding::Real(v),
                Err(e) => {
                    warn!(item = i, error = %e, "embedding failed, substituting fallback vector");
                    Embedding::Fallback(self.fallback_vector())
                }
            })
            .collect()
    }

    /// Embed a single text (used for queries).
    ///
    /// In mock mode this returns a fallback vector. With a live backend,
    /// failures are returned rather than papered over.
    pub async fn embed_one(&self, text: &str) -> Result<Embedding, EmbedError> {
        match self.backend.as_deref() {
            None => Ok(Embedding::Fallback(self.fallback_vector())),
            Some(backend) => {
                let vector = backend.embed_text(text).await?;
                self.check(vector).map(Embedding::Real)
            }
        }
    }

    /// Count tokens, falling back to [`estimate_tokens`] when the backend
    /// is absent, unable, or failing.
    pub async fn count_tokens(&self, text: &str) -> TokenCount {
        let Some(backend) = self.backend.as_deref() else {
            return TokenCount::Estimated(estimate_tokens(text));
        };
        match backend.count_tokens(text).await {
            Ok(Some(n)) => TokenCount::Provider(n),
            Ok(None) => TokenCount::Estimated(estimate_tokens(text)),
            Err(e) => {
                warn!(error = %e, "token count failed, using estimate");
                TokenCount::Estimated(estimate_tokens(text))
            }
        }
    }

    fn check(&self, vector: Vec<f32>) -> Result<Vec<f32>, EmbedError> {
        if vector.is_empty() {
            return Err(EmbedError::EmptyVector);
        }
        if vector.len() != self.dims {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dims,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|x| !x.is_finite()) {
            return Err(EmbedError::NonFinite);
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns `[len, 1, 0, …]` for each text; fails on texts containing "fail".
    struct StubBackend {
        dims: usize,
        tokens: Option<usize>,
    }

    #[async_trait]
    impl EmbeddingBackend for StubBackend {
        fn model_name(&self) -> &str {
            "stub"
        }
        fn dims(&self) -> usize {
            self.dims
        }
        async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
            if text.contains("fail") {
                return Err(EmbedError::Backend("stub failure".to_string()));
            }
            if text.contains("empty") {
                return Ok(Vec::new());
            }
            if text.contains("short") {
                return Ok(vec![1.0]);
            }
            if text.contains("nan") {
                let mut v = vec![0.5; self.dims];
                v[1] = f32::NAN;
                return Ok(v);
            }
            let mut v = vec![0.0; self.dims];
            v[0] = text.len() as f32;
            v[1] = 1.0;
            Ok(v)
        }
        async fn count_tokens(&self, _text: &str) -> Result<Option<usize>, EmbedError> {
            Ok(self.tokens)
        }
    }

    /// Batch endpoint that drops the last result.
    struct ShortBatchBackend;

    #[async_trait]
    impl EmbeddingBackend for ShortBatchBackend {
        fn model_name(&self) -> &str {
            "short-batch"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_text(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Ok(vec![1.0, 0.0])
        }
        async fn embed_texts(&self, texts: &[String]) -> Vec<Result<Vec<f32>, EmbedError>> {
            texts.iter().skip(1).map(|_| Ok(vec![0.0, 1.0])).collect()
        }
    }

    fn texts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_mock_embed_shape() {
        let provider = EmbeddingProvider::mock(NOMINAL_DIMS);
        let out = provider.embed(&texts(&["a", "b", "c"])).await;
        assert_eq!(out.len(), 3);
        for e in &out {
            assert!(e.is_fallback());
            assert_eq!(e.dims(), NOMINAL_DIMS);
            assert!(e.vector().iter().all(|x| (-1.0..1.0).contains(x)));
        }
    }

    #[tokio::test]
    async fn test_mock_embed_one_is_fallback_not_error() {
        let provider = EmbeddingProvider::mock(16);
        let e = provider.embed_one("query").await.unwrap();
        assert!(e.is_fallback());
        assert_eq!(e.dims(), 16);
    }

    #[test]
    fn test_seeded_fallback_reproducible() {
        let a = FallbackVectors::seeded(42);
        let b = FallbackVectors::seeded(42);
        assert_eq!(a.generate(32), b.generate(32));
        assert_ne!(a.generate(32), FallbackVectors::seeded(43).generate(32));
    }

    #[tokio::test]
    async fn test_partial_failure_substitutes_only_failed_items() {
        let provider = EmbeddingProvider::new(Box::new(StubBackend { dims: 8, tokens: None }));
        let out = provider
            .embed(&texts(&["first", "please fail", "empty one", "short", "last"]))
            .await;
        assert_eq!(out.len(), 5);
        assert!(!out[0].is_fallback());
        assert!(out[1].is_fallback());
        assert!(out[2].is_fallback());
        assert!(out[3].is_fallback());
        assert!(!out[4].is_fallback());
        assert!(out.iter().all(|e| e.dims() == 8));
        assert_eq!(out[0].vector()[0], 5.0);
    }

    #[tokio::test]
    async fn test_embed_one_surfaces_failures() {
        let provider = EmbeddingProvider::new(Box::new(StubBackend { dims: 8, tokens: None }));
        assert_eq!(
            provider.embed_one("fail").await,
            Err(EmbedError::Backend("stub failure".to_string()))
        );
        assert_eq!(provider.embed_one("empty").await, Err(EmbedError::EmptyVector));
        assert_eq!(
            provider.embed_one("short").await,
            Err(EmbedError::DimensionMismatch { expected: 8, actual: 1 })
        );
        assert!(!provider.embed_one("fine").await.unwrap().is_fallback());
    }

    #[tokio::test]
    async fn test_non_finite_vectors_are_failures() {
        let provider = EmbeddingProvider::new(Box::new(StubBackend { dims: 8, tokens: None }));
        assert_eq!(provider.embed_one("nan").await, Err(EmbedError::NonFinite));

        let out = provider.embed(&texts(&["first", "a nan here", "last"])).await;
        assert!(!out[0].is_fallback());
        assert!(out[1].is_fallback());
        assert!(out[1].vector().iter().all(|x| x.is_finite()));
        assert!(!out[2].is_fallback());
    }

    #[tokio::test]
    async fn test_wrong_batch_count_retries_per_item() {
        let provider = EmbeddingProvider::new(Box::new(ShortBatchBackend));
        let out = provider.embed(&texts(&["a", "b", "c"])).await;
        assert_eq!(out.len(), 3);
        for e in out {
            assert_eq!(e, Embedding::Real(vec![1.0, 0.0]));
        }
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens("日本語です"), 2);
    }

    #[tokio::test]
    async fn test_count_tokens_sources() {
        let mock = EmbeddingProvider::mock(4);
        assert_eq!(mock.count_tokens("abcdefgh").await, TokenCount::Estimated(2));

        let live = EmbeddingProvider::new(Box::new(StubBackend { dims: 4, tokens: Some(11) }));
        assert_eq!(live.count_tokens("abcdefgh").await, TokenCount::Provider(11));

        let unable = EmbeddingProvider::new(Box::new(StubBackend { dims: 4, tokens: None }));
        let count = unable.count_tokens("abcdefgh").await;
        assert!(count.is_estimate());
        assert_eq!(count.value(), 2);
    }
}
