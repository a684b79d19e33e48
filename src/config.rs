//! TOML configuration.
//!
//! Every section has defaults, so an absent config file yields a working
//! setup rooted at the current directory (see [`Config::default`]). The
//! language-model credential is never read from the file: `[llm].api_key_env`
//! names the environment variable that holds it.
//!
//! ```toml
//! [paths]
//! data_dir = "data"
//! index_dir = "vector_db"
//!
//! [chunking]
//! chunk_size = 1000
//! chunk_overlap = 200
//!
//! [retrieval]
//! top_k = 3
//!
//! [llm]
//! model = "llama-3.1-8b-instant"
//! api_key_env = "GROQ_API_KEY"
//!
//! [server]
//! bind = "0.0.0.0:8193"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Directory scanned by a full ingest.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory holding the persisted vector index.
    #[serde(default = "default_index_dir")]
    pub index_dir: PathBuf,
    /// Root that explicit ingest paths must stay under. Defaults to the
    /// process working directory.
    #[serde(default)]
    pub allowed_root: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            index_dir: default_index_dir(),
            allowed_root: None,
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
fn default_index_dir() -> PathBuf {
    PathBuf::from("vector_db")
}

impl PathsConfig {
    /// Resolves the root used for explicit-path validation.
    pub fn allowed_root(&self) -> Result<PathBuf> {
        match &self.allowed_root {
            Some(root) => Ok(root.clone()),
            None => std::env::current_dir().context("Failed to resolve working directory"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            dims: default_dims(),
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    /// Base URL of an OpenAI-compatible chat completions API.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            base_url: default_llm_base_url(),
            api_key_env: default_api_key_env(),
            temperature: 0.0,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_model() -> String {
    "llama-3.1-8b-instant".to_string()
}
fn default_llm_base_url() -> String {
    "https://api.groq.com/openai/v1".to_string()
}
fn default_api_key_env() -> String {
    "GROQ_API_KEY".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    /// Reads the credential from the configured environment variable.
    /// Blank values count as missing.
    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_ingest_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_ingest_timeout_secs(),
        }
    }
}

fn default_ingest_timeout_secs() -> u64 {
    900
}

impl IngestConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
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
    "0.0.0.0:8193".to_string()
}

/// Models the local embedders can run. All are the same all-MiniLM-L6-v2
/// weights under different spellings.
const SUPPORTED_EMBEDDING_MODELS: &[&str] = &[
    "all-minilm-l6-v2",
    "sentence-transformers/all-MiniLM-L6-v2",
];

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

/// Loads `path` when it exists, otherwise returns the defaults.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        load_config(path)
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Ok(Config::default())
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        if self.retrieval.top_k < 1 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }

        if !SUPPORTED_EMBEDDING_MODELS.contains(&self.embedding.model.as_str()) {
            anyhow::bail!(
                "Unknown embedding model: '{}'. Supported: {}",
                self.embedding.model,
                SUPPORTED_EMBEDDING_MODELS.join(", ")
            );
        }
        if self.embedding.dims == 0 {
            anyhow::bail!("embedding.dims must be > 0");
        }
        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be > 0");
        }

        if self.embedding.timeout_secs == 0 {
            anyhow::bail!("embedding.timeout_secs must be > 0");
        }
        if self.llm.timeout_secs == 0 {
            anyhow::bail!("llm.timeout_secs must be > 0");
        }
        if self.ingest.timeout_secs == 0 {
            anyhow::bail!("ingest.timeout_secs must be > 0");
        }

        if self.llm.api_key_env.trim().is_empty() {
            anyhow::bail!("llm.api_key_env must name an environment variable");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("llm.temperature must be in [0.0, 2.0]");
        }

        Ok(())
    }
}
