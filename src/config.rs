//! TOML configuration parsing and validation.
//!
//! Every section is optional. A missing config file yields
//! [`Config::default`], which runs the mock embedding provider so the whole
//! pipeline works without credentials.
//!
//! ```toml
//! [chunking]
//! chunk_size = 50
//! overlap = 10
//!
//! [embedding]
//! provider = "gemini"   # mock | gemini | openai | ollama | local
//! model = "text-embedding-004"
//! dims = 768
//!
//! [visualization]
//! seed = 0.0
//! top_k = 5
//!
//! [server]
//! bind = "127.0.0.1:7341"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use ragviz_core::embedding::NOMINAL_DIMS;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub visualization: VisualizationConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Words per chunk (clamped to at least 10).
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Words shared by consecutive chunks.
    #[serde(default = "default_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
        }
    }
}

impl ChunkingConfig {
    /// Apply per-request overrides on top of the configured values.
    ///
    /// Overrides come from CLI flags and HTTP bodies as signed integers;
    /// negatives saturate to 0. Clamping to valid chunking parameters is
    /// left to the chunker.
    pub fn resolve(&self, chunk_size: Option<i64>, overlap: Option<i64>) -> (usize, usize) {
        let saturate = |v: i64| usize::try_from(v).unwrap_or(0);
        (
            chunk_size.map(saturate).unwrap_or(self.chunk_size),
            overlap.map(saturate).unwrap_or(self.overlap),
        )
    }
}

fn default_chunk_size() -> usize {
    50
}
fn default_overlap() -> usize {
    10
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    /// Model used for Gemini `countTokens`.
    #[serde(default)]
    pub token_model: Option<String>,
    /// Texts sent per batch request. Gemini caps `batchEmbedContents` at 100.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Seed for reproducible fallback vectors.
    #[serde(default)]
    pub fallback_seed: Option<u64>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            token_model: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            fallback_seed: None,
        }
    }
}

fn default_provider() -> String {
    "mock".to_string()
}
fn default_batch_size() -> usize {
    100
}
fn default_max_retries() -> u32 {
    3
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_mock(&self) -> bool {
        self.provider == "mock"
    }

    /// Configured dimensionality, or the nominal 768.
    pub fn dims_or_nominal(&self) -> usize {
        self.dims.unwrap_or(NOMINAL_DIMS)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VisualizationConfig {
    /// Projection seed used when a query does not pass one.
    #[serde(default)]
    pub seed: f64,
    /// Hits shown by `ragviz query` unless `--limit` overrides it.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            seed: 0.0,
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

/// Load the config at `path`, or defaults if the file does not exist.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.embedding.provider.as_str() {
        "mock" | "gemini" | "openai" | "ollama" | "local" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be mock, gemini, openai, ollama, or local.",
            other
        ),
    }

    if config.embedding.dims == Some(0) {
        anyhow::bail!("embedding.dims must be > 0");
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    if config.visualization.top_k == 0 {
        anyhow::bail!("visualization.top_k must be >= 1");
    }

    if !config.visualization.seed.is_finite() {
        anyhow::bail!("visualization.seed must be a finite number");
    }

    Ok(())
}
