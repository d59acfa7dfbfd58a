//! Concrete embedding backends and provider construction.
//!
//! Implements [`EmbeddingBackend`] for:
//! - **[`GeminiBackend`]**: Google Generative Language API (`embedContent`,
//!   `batchEmbedContents`, `countTokens`). Default `text-embedding-004`, 768 dims.
//! - **[`OpenAIBackend`]**: `POST /v1/embeddings` with batching.
//! - **[`OllamaBackend`]**: a local Ollama instance's `/api/embed` endpoint.
//! - **`LocalBackend`**: fastembed, behind the `local-embeddings-fastembed` feature.
//!
//! # Provider Selection
//!
//! Use [`create_provider`] to build the [`EmbeddingProvider`] the pipeline
//! runs with:
//!
//! ```rust
//! # use ragviz::config::EmbeddingConfig;
//! # use ragviz::embedding::create_provider;
//! let config = EmbeddingConfig::default(); // provider = "mock"
//! let provider = create_provider(&config).unwrap();
//! assert!(provider.is_mock());
//! ```
//!
//! A hosted provider whose API key is missing does not fail: it degrades to
//! mock mode and logs an advisory.
//!
//! # Retry Strategy
//!
//! All HTTP backends use exponential backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Batched backends send at most `embedding.batch_size` texts per request.
//! A batch the backend rejects, or answers with the wrong number of vectors,
//! is redone one text at a time so a single bad text costs only its own
//! vector. A batch that exhausts its retries ends the run: the remaining
//! texts get fallback vectors without further requests.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::warn;

use ragviz_core::embedding::{EmbeddingBackend, EmbeddingProvider};
use ragviz_core::EmbedError;

use crate::config::EmbeddingConfig;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const OPENAI_EMBEDDINGS_URL: &str = "https://api.openai.com/v1/embeddings";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Build the [`EmbeddingProvider`] described by `config`.
///
/// # Supported Providers
///
/// | Config Value | Backend | Credentials |
/// |-------------|---------|-------------|
/// | `"mock"` | none (fallback vectors) | none |
/// | `"gemini"` | [`GeminiBackend`] | `GEMINI_API_KEY` |
/// | `"openai"` | [`OpenAIBackend`] | `OPENAI_API_KEY` |
/// | `"ollama"` | [`OllamaBackend`] | none |
/// | `"local"` | `LocalBackend` (feature `local-embeddings-fastembed`) | none |
///
/// # Errors
///
/// Returns an error for unknown provider names, or when the HTTP client
/// cannot be built.
pub fn create_provider(config: &EmbeddingConfig) -> Result<EmbeddingProvider> {
    build_provider(config, &|var| std::env::var(var).ok())
}

fn build_provider(
    config: &EmbeddingConfig,
    env: &dyn Fn(&str) -> Option<String>,
) -> Result<EmbeddingProvider> {
    let key = |var: &str| env(var).filter(|k| !k.trim().is_empty());

    let provider = match config.provider.as_str() {
        "mock" => EmbeddingProvider::mock(config.dims_or_nominal()),
        "gemini" => match key("GEMINI_API_KEY") {
            Some(api_key) => EmbeddingProvider::new(Box::new(GeminiBackend::new(config, api_key)?)),
            None => degraded(config, "GEMINI_API_KEY"),
        },
        "openai" => match key("OPENAI_API_KEY") {
            Some(api_key) => EmbeddingProvider::new(Box::new(OpenAIBackend::new(config, api_key)?)),
            None => degraded(config, "OPENAI_API_KEY"),
        },
        "ollama" => EmbeddingProvider::new(Box::new(OllamaBackend::new(config)?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => EmbeddingProvider::new(Box::new(LocalBackend::new(config))),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local embedding provider requires --features local-embeddings-fastembed"),
        other => bail!("Unknown embedding provider: {}", other),
    };

    Ok(match config.fallback_seed {
        Some(seed) => provider.with_fallback_seed(seed),
        None => provider,
    })
}

/// Mock provider standing in for a hosted one with no credentials.
fn degraded(config: &EmbeddingConfig, var: &str) -> EmbeddingProvider {
    warn!(
        provider = %config.provider,
        "{} not set; using mock embeddings, similarity scores will be meaningless",
        var
    );
    EmbeddingProvider::mock(config.dims_or_nominal())
}

fn backend_err(e: anyhow::Error) -> EmbedError {
    EmbedError::Backend(format!("{:#}", e))
}

/// Embed each text with its own request, keeping failures per item.
async fn embed_each<B: EmbeddingBackend + ?Sized>(
    backend: &B,
    texts: &[String],
) -> Vec<Result<Vec<f32>, EmbedError>> {
    let mut results = Vec::with_capacity(texts.len());
    for text in texts {
        results.push(backend.embed_text(text).await);
    }
    results
}

/// A backend with a native multi-text endpoint.
#[async_trait]
trait BatchEmbed: EmbeddingBackend {
    /// Maximum texts per request.
    fn batch_size(&self) -> usize;

    /// One request for all of `texts`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed `texts` in requests of at most `batch_size` texts, keeping input
/// order.
///
/// A batch whose response does not line up with its input, or that the
/// backend rejected outright, is redone one text at a time. A batch that
/// is still failing after every retry marks the backend unavailable: the
/// remaining texts fail without further requests.
async fn embed_batched<B: BatchEmbed + ?Sized>(
    backend: &B,
    texts: &[String],
) -> Vec<Result<Vec<f32>, EmbedError>> {
    let mut results = Vec::with_capacity(texts.len());

    for batch in texts.chunks(backend.batch_size().max(1)) {
        match backend.embed_batch(batch).await {
            Ok(vectors) if vectors.len() == batch.len() => {
                results.extend(vectors.into_iter().map(Ok));
            }
            Ok(vectors) => {
                warn!(
                    model = backend.model_name(),
                    expected = batch.len(),
                    actual = vectors.len(),
                    "batch returned wrong number of vectors, retrying per item"
                );
                results.extend(embed_each(backend, batch).await);
            }
            Err(e) if e.downcast_ref::<Unavailable>().is_some() => {
                warn!(
                    model = backend.model_name(),
                    error = %e,
                    remaining = texts.len() - results.len(),
                    "embedding backend unavailable, giving up on remaining texts"
                );
                results.resize(texts.len(), Err(backend_err(e)));
                break;
            }
            Err(e) => {
                warn!(model = backend.model_name(), error = %e, "batch embedding failed, retrying per item");
                results.extend(embed_each(backend, batch).await);
            }
        }
    }

    results
}

// ============ HTTP with retry ============

/// A request kept failing with 429, 5xx, or network errors until retries
/// ran out.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Unavailable(String);

/// `reqwest` client plus the retry policy shared by all HTTP backends.
struct RetryingClient {
    client: reqwest::Client,
    max_retries: u32,
    batch_size: usize,
}

impl RetryingClient {
    fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
            batch_size: config.batch_size,
        })
    }

    /// Send the request built by `build`, retrying transient failures, and
    /// return the JSON body of the first successful response.
    ///
    /// Once retries are exhausted the error is an [`Unavailable`].
    async fn send_json<F>(&self, label: &str, build: F) -> Result<serde_json::Value>
    where
        F: Fn(&reqwest::Client) -> reqwest::RequestBuilder + Send + Sync,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                // Exponential backoff: 1s, 2s, 4s, 8s, ...
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                warn!(attempt, delay_secs = delay.as_secs(), "{} request failed, retrying", label);
                tokio::time::sleep(delay).await;
            }

            match build(&self.client).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return Ok(response.json().await?);
                    }

                    // Rate limited or server error, retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err = Some(format!("{} API error {}: {}", label, status, body_text));
                        continue;
                    }

                    // Client error (not 429), don't retry
                    let body_text = response.text().await.unwrap_or_default();
                    bail!("{} API error {}: {}", label, status, body_text);
                }
                Err(e) => {
                    last_err = Some(format!("{} connection error: {}", label, e));
                    continue;
                }
            }
        }

        let message = last_err.unwrap_or_else(|| format!("{} request failed after retries", label));
        Err(Unavailable(message).into())
    }
}

/// Convert a JSON array of numbers into a vector.
fn json_to_vec(values: &serde_json::Value) -> Result<Vec<f32>> {
    values
        .as_array()
        .ok_or_else(|| anyhow!("embedding is not an array"))?
        .iter()
        .map(|v| {
            v.as_f64()
                .map(|f| f as f32)
                .ok_or_else(|| anyhow!("embedding contains a non-numeric value"))
        })
        .collect()
}

// ============ Gemini Backend ============

/// Embedding backend using the Google Generative Language API.
///
/// Requires the `GEMINI_API_KEY` environment variable. Supports native
/// token counting through `countTokens`.
pub struct GeminiBackend {
    http: RetryingClient,
    api_key: String,
    /// Model name without the `models/` prefix (e.g. `"text-embedding-004"`).
    model: String,
    dims: usize,
    /// Generative model used for `countTokens`.
    token_model: String,
}

impl GeminiBackend {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "text-embedding-004".to_string());
        let token_model = config
            .token_model
            .clone()
            .unwrap_or_else(|| "gemini-2.0-flash".to_string());

        Ok(Self {
            http: RetryingClient::new(config)?,
            api_key,
            model: model.trim_start_matches("models/").to_string(),
            dims: config.dims_or_nominal(),
            token_model: token_model.trim_start_matches("models/").to_string(),
        })
    }

    fn content(&self, text: &str) -> serde_json::Value {
        serde_json::json!({
            "model": format!("models/{}", self.model),
            "content": { "parts": [{ "text": text }] },
        })
    }
}

#[async_trait]
impl BatchEmbed for GeminiBackend {
    fn batch_size(&self) -> usize {
        self.http.batch_size
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/models/{}:batchEmbedContents", GEMINI_BASE_URL, self.model);
        let body = serde_json::json!({
            "requests": texts.iter().map(|t| self.content(t)).collect::<Vec<_>>(),
        });
        let json = self
            .http
            .send_json("Gemini", |client| {
                client
                    .post(&url)
                    .header("x-goog-api-key", &self.api_key)
                    .json(&body)
            })
            .await?;
        parse_gemini_batch(&json)
    }
}

#[async_trait]
impl EmbeddingBackend for GeminiBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let url = format!("{}/models/{}:embedContent", GEMINI_BASE_URL, self.model);
        let body = self.content(text);
        let json = self
            .http
            .send_json("Gemini", |client| {
                client
                    .post(&url)
                    .header("x-goog-api-key", &self.api_key)
                    .json(&body)
            })
            .await
            .map_err(backend_err)?;
        parse_gemini_embedding(&json).map_err(|e| EmbedError::InvalidResponse(e.to_string()))
    }

    async fn embed_texts(&self, texts: &[String]) -> Vec<Result<Vec<f32>, EmbedError>> {
        embed_batched(self, texts).await
    }

    async fn count_tokens(&self, text: &str) -> Result<Option<usize>, EmbedError> {
        let url = format!("{}/models/{}:countTokens", GEMINI_BASE_URL, self.token_model);
        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": text }] }],
        });
        let json = self
            .http
            .send_json("Gemini", |client| {
                client
                    .post(&url)
                    .header("x-goog-api-key", &self.api_key)
                    .json(&body)
            })
            .await
            .map_err(backend_err)?;
        parse_gemini_token_count(&json)
            .map(Some)
            .map_err(|e| EmbedError::InvalidResponse(e.to_string()))
    }
}

/// Parse an `embedContent` response: `{"embedding": {"values": [...]}}`.
///
/// A missing or empty `values` array yields an empty vector, which the
/// provider treats as a failed item.
fn parse_gemini_embedding(json: &serde_json::Value) -> Result<Vec<f32>> {
    let embedding = json
        .get("embedding")
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing embedding"))?;
    match embedding.get("values") {
        Some(values) => json_to_vec(values),
        None => Ok(Vec::new()),
    }
}

/// Parse a `batchEmbedContents` response: `{"embeddings": [{"values": [...]}, ...]}`.
fn parse_gemini_batch(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing embeddings array"))?;

    embeddings
        .iter()
        .map(|e| match e.get("values") {
            Some(values) => json_to_vec(values),
            None => Ok(Vec::new()),
        })
        .collect()
}

/// Parse a `countTokens` response: `{"totalTokens": 42}`.
fn parse_gemini_token_count(json: &serde_json::Value) -> Result<usize> {
    json.get("totalTokens")
        .and_then(|t| t.as_u64())
        .map(|t| t as usize)
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing totalTokens"))
}

// ============ OpenAI Backend ============

/// Embedding backend using the OpenAI API.
///
/// Calls the `POST /v1/embeddings` endpoint with the configured model.
/// Requires the `OPENAI_API_KEY` environment variable to be set.
pub struct OpenAIBackend {
    http: RetryingClient,
    api_key: String,
    /// Model name (e.g. `"text-embedding-3-small"`).
    model: String,
    /// Vector dimensionality (e.g. `1536`).
    dims: usize,
    /// Sent as `dimensions` when set in config.
    requested_dims: Option<usize>,
}

impl OpenAIBackend {
    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "text-embedding-3-small".to_string());

        Ok(Self {
            http: RetryingClient::new(config)?,
            api_key,
            model,
            dims: config.dims.unwrap_or(1536),
            requested_dims: config.dims,
        })
    }
}

#[async_trait]
impl BatchEmbed for OpenAIBackend {
    fn batch_size(&self) -> usize {
        self.http.batch_size
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        if let Some(dims) = self.requested_dims {
            body["dimensions"] = serde_json::json!(dims);
        }

        let json = self
            .http
            .send_json("OpenAI", |client| {
                client
                    .post(OPENAI_EMBEDDINGS_URL)
                    .header("Authorization", format!("Bearer {}", self.api_key))
                    .json(&body)
            })
            .await?;
        parse_openai_response(&json)
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAIBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let vectors = self
            .embed_batch(&[text.to_string()])
            .await
            .map_err(backend_err)?;
        vectors.into_iter().next().ok_or(EmbedError::EmptyVector)
    }

    async fn embed_texts(&self, texts: &[String]) -> Vec<Result<Vec<f32>, EmbedError>> {
        embed_batched(self, texts).await
    }
}

/// Parse the OpenAI embeddings API response JSON.
///
/// Extracts the `data[].embedding` arrays and returns them ordered by
/// their `index` field.
fn parse_openai_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing data array"))?;

    let mut indexed = Vec::with_capacity(data.len());

    for (position, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .ok_or_else(|| anyhow!("Invalid OpenAI response: missing embedding"))?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, json_to_vec(embedding)?));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

// ============ Ollama Backend ============

/// Embedding backend using a local Ollama instance.
///
/// Calls `POST /api/embed` on the configured URL (default: `http://localhost:11434`).
/// Requires Ollama to be running with an embedding model pulled (e.g. `ollama pull nomic-embed-text`).
pub struct OllamaBackend {
    http: RetryingClient,
    model: String,
    dims: usize,
    url: String,
}

impl OllamaBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .unwrap_or_else(|| "nomic-embed-text".to_string());
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());

        Ok(Self {
            http: RetryingClient::new(config)?,
            model,
            dims: config.dims_or_nominal(),
            url: url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BatchEmbed for OllamaBackend {
    fn batch_size(&self) -> usize {
        self.http.batch_size
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let endpoint = format!("{}/api/embed", self.url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = self
            .http
            .send_json("Ollama", |client| client.post(&endpoint).json(&body))
            .await
            .with_context(|| format!("is Ollama running at {}?", self.url))?;
        parse_ollama_response(&json)
    }
}

#[async_trait]
impl EmbeddingBackend for OllamaBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let vectors = self
            .embed_batch(&[text.to_string()])
            .await
            .map_err(backend_err)?;
        vectors.into_iter().next().ok_or(EmbedError::EmptyVector)
    }

    async fn embed_texts(&self, texts: &[String]) -> Vec<Result<Vec<f32>, EmbedError>> {
        embed_batched(self, texts).await
    }
}

fn parse_ollama_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let embeddings = json
        .get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| anyhow!("Invalid Ollama response: missing embeddings array"))?;

    embeddings.iter().map(json_to_vec).collect()
}

// ============ Local Backend (fastembed) ============

/// Embedding backend for local inference with fastembed.
///
/// Models are downloaded on first use from Hugging Face and cached.
/// After the initial download, no network calls are needed.
#[cfg(feature = "local-embeddings-fastembed")]
pub struct LocalBackend {
    model_name: String,
    dims: usize,
    batch_size: usize,
}

#[cfg(feature = "local-embeddings-fastembed")]
impl LocalBackend {
    pub fn new(config: &EmbeddingConfig) -> Self {
        let model_name = config
            .model
            .clone()
            .unwrap_or_else(|| "bge-base-en-v1.5".to_string());
        let dims = config.dims.unwrap_or(match model_name.as_str() {
            "all-minilm-l6-v2" | "bge-small-en-v1.5" => 384,
            "bge-large-en-v1.5" => 1024,
            _ => 768,
        });
        Self {
            model_name,
            dims,
            batch_size: config.batch_size,
        }
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl BatchEmbed for LocalBackend {
    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let fastembed_model = match self.model_name.as_str() {
            "all-minilm-l6-v2" => fastembed::EmbeddingModel::AllMiniLML6V2,
            "bge-small-en-v1.5" => fastembed::EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" => fastembed::EmbeddingModel::BGEBaseENV15,
            "bge-large-en-v1.5" => fastembed::EmbeddingModel::BGELargeENV15,
            "nomic-embed-text-v1.5" => fastembed::EmbeddingModel::NomicEmbedTextV15,
            other => bail!(
                "Unknown local embedding model: '{}'. Supported models: \
                 all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
                 nomic-embed-text-v1.5",
                other
            ),
        };
        let texts = texts.to_vec();

        tokio::task::spawn_blocking(move || {
            let mut model = fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(true),
            )
            .map_err(|e| anyhow!("Failed to initialize local embedding model: {}", e))?;

            model
                .embed(texts, None)
                .map_err(|e| anyhow!("Local embedding failed: {}", e))
        })
        .await?
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
#[async_trait]
impl EmbeddingBackend for LocalBackend {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        let vectors = self
            .embed_batch(&[text.to_string()])
            .await
            .map_err(backend_err)?;
        vectors.into_iter().next().ok_or(EmbedError::EmptyVector)
    }

    async fn embed_texts(&self, texts: &[String]) -> Vec<Result<Vec<f32>, EmbedError>> {
        embed_batched(self, texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config(provider: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: provider.to_string(),
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn test_mock_provider() {
        let provider = create_provider(&config("mock")).unwrap();
        assert!(provider.is_mock());
        assert_eq!(provider.dims(), 768);
    }

    #[test]
    fn test_missing_key_degrades_to_mock() {
        let mut cfg = config("gemini");
        cfg.dims = Some(64);
        let provider = build_provider(&cfg, &|_| None).unwrap();
        assert!(provider.is_mock());
        assert_eq!(provider.dims(), 64);

        let provider = build_provider(&config("openai"), &|_| Some("  ".to_string())).unwrap();
        assert!(provider.is_mock());
    }

    #[test]
    fn test_key_present_builds_live_provider() {
        let provider =
            build_provider(&config("gemini"), &|_| Some("test-key".to_string())).unwrap();
        assert!(!provider.is_mock());
        assert_eq!(provider.model_name(), "text-embedding-004");
        assert_eq!(provider.dims(), 768);

        let provider =
            build_provider(&config("openai"), &|_| Some("test-key".to_string())).unwrap();
        assert_eq!(provider.model_name(), "text-embedding-3-small");
        assert_eq!(provider.dims(), 1536);
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let provider = build_provider(&config("ollama"), &|_| None).unwrap();
        assert!(!provider.is_mock());
        assert_eq!(provider.model_name(), "nomic-embed-text");
    }

    #[test]
    fn test_unknown_provider() {
        assert!(create_provider(&config("magic")).is_err());
    }

    #[test]
    fn test_parse_gemini_embedding() {
        let v = parse_gemini_embedding(&json!({"embedding": {"values": [0.5, -1.0]}})).unwrap();
        assert_eq!(v, vec![0.5, -1.0]);

        // absent values is an empty vector, not an error
        let v = parse_gemini_embedding(&json!({"embedding": {}})).unwrap();
        assert!(v.is_empty());

        assert!(parse_gemini_embedding(&json!({"error": "nope"})).is_err());
    }

    #[test]
    fn test_parse_gemini_batch() {
        let json = json!({"embeddings": [{"values": [1.0]}, {}, {"values": [2.0]}]});
        let vs = parse_gemini_batch(&json).unwrap();
        assert_eq!(vs, vec![vec![1.0], vec![], vec![2.0]]);
    }

    #[test]
    fn test_parse_gemini_token_count() {
        assert_eq!(parse_gemini_token_count(&json!({"totalTokens": 17})).unwrap(), 17);
        assert!(parse_gemini_token_count(&json!({})).is_err());
    }

    #[test]
    fn test_parse_openai_orders_by_index() {
        let json = json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        });
        let vs = parse_openai_response(&json).unwrap();
        assert_eq!(vs, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_ollama_response() {
        let vs = parse_ollama_response(&json!({"embeddings": [[0.25, 0.75]]})).unwrap();
        assert_eq!(vs, vec![vec![0.25, 0.75]]);
        assert!(parse_ollama_response(&json!({"embeddings": [["x"]]})).is_err());
    }

    type Reply = fn(&[String]) -> (StatusCode, serde_json::Value);

    /// Serve `/api/embed` on a local port; returns an Ollama config pointing
    /// at it and the number of requests received.
    async fn spawn_ollama(reply: Reply) -> (EmbeddingConfig, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let app = Router::new().route(
            "/api/embed",
            post(move |Json(body): Json<serde_json::Value>| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    let input: Vec<String> =
                        serde_json::from_value(body["input"].clone()).unwrap_or_default();
                    let (status, json) = reply(&input);
                    (status, Json(json))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let cfg = EmbeddingConfig {
            provider: "ollama".to_string(),
            url: Some(format!("http://{}", addr)),
            dims: Some(2),
            max_retries: 0,
            ..EmbeddingConfig::default()
        };
        (cfg, hits)
    }

    /// `[len(text), 1]` for every input text.
    fn vectors(input: &[String]) -> serde_json::Value {
        json!({ "embeddings": input.iter().map(|t| vec![t.len() as f32, 1.0]).collect::<Vec<_>>() })
    }

    fn words(n: usize) -> Vec<String> {
        (1..=n).map(|i| "w".repeat(i)).collect()
    }

    #[tokio::test]
    async fn test_unavailable_backend_stops_after_first_batch() {
        let (mut cfg, hits) =
            spawn_ollama(|_| (StatusCode::SERVICE_UNAVAILABLE, json!({"error": "loading"}))).await;
        cfg.max_retries = 1;
        cfg.batch_size = 2;
        let provider = build_provider(&cfg, &|_| None).unwrap();

        let out = provider.embed(&words(5)).await;

        assert_eq!(out.len(), 5);
        assert!(out.iter().all(|e| e.is_fallback() && e.dims() == 2));
        // one batch, one retry, nothing per item or for later batches
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_texts_split_into_batches() {
        let (mut cfg, hits) = spawn_ollama(|input| {
            if input.len() > 2 {
                (StatusCode::BAD_REQUEST, json!({"error": "too many inputs"}))
            } else {
                (StatusCode::OK, vectors(input))
            }
        })
        .await;
        cfg.batch_size = 2;
        let backend = OllamaBackend::new(&cfg).unwrap();

        let out = backend.embed_texts(&words(5)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 3);
        for (i, result) in out.into_iter().enumerate() {
            assert_eq!(result, Ok(vec![(i + 1) as f32, 1.0]));
        }
    }

    #[tokio::test]
    async fn test_rejected_batch_retries_per_item() {
        let (cfg, hits) = spawn_ollama(|input| {
            if input.len() > 1 {
                (StatusCode::BAD_REQUEST, json!({"error": "batch rejected"}))
            } else {
                (StatusCode::OK, vectors(input))
            }
        })
        .await;
        let backend = OllamaBackend::new(&cfg).unwrap();

        let out = backend.embed_texts(&words(4)).await;

        assert_eq!(hits.load(Ordering::SeqCst), 1 + 4);
        assert!(out.iter().all(|r| r.is_ok()));
    }
}
