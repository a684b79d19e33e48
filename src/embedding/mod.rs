//! Text embedding.
//!
//! The [`Embedder`] trait maps text to fixed-dimension vectors. Index
//! building and query answering must use the same embedder: the model
//! identifier reported by [`Embedder::model_name`] is stored alongside the
//! persisted index and checked when the index is loaded.
//!
//! [`LocalEmbedder`] runs sentence-transformers all-MiniLM-L6-v2 locally,
//! via fastembed (primary) or tract (musl/Intel Mac). The model is
//! downloaded on first use and cached; after that no network calls are
//! made.
//!
//! Also provides vector utilities used by the index:
//! - [`cosine_similarity`] - similarity between two vectors
//! - [`vec_to_blob`] / [`blob_to_vec`] - little-endian `f32` BLOB encoding

#[cfg(feature = "local-embeddings-tract")]
mod local_tract;

use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::{RagError, Result};

/// Canonical identifier of the only supported embedding model.
pub const MINILM_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const MINILM_DIMS: usize = 384;

/// Maps text to vectors. Implementations must be deterministic: the same
/// text always yields the same vector for a given model.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier stored with the index, e.g.
    /// `"sentence-transformers/all-MiniLM-L6-v2"`.
    fn model_name(&self) -> &str;

    fn dims(&self) -> usize;

    /// Embeds a batch, returning one vector per input in input order.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_texts(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("empty embedding response".to_string()))
    }
}

/// Maps any accepted spelling of the model name to [`MINILM_MODEL_ID`].
pub fn canonical_model_id(name: &str) -> Result<&'static str> {
    match name {
        "all-minilm-l6-v2" | "sentence-transformers/all-MiniLM-L6-v2" => Ok(MINILM_MODEL_ID),
        other => Err(RagError::Embedding(format!(
            "Unknown local embedding model: '{}'. Supported: all-minilm-l6-v2",
            other
        ))),
    }
}

/// Local all-MiniLM-L6-v2 embedder.
///
/// The fastembed model is initialised lazily on the first call and reused
/// afterwards; inference runs on the blocking thread pool.
pub struct LocalEmbedder {
    model_name: &'static str,
    dims: usize,
    batch_size: usize,
    timeout: Duration,
    #[cfg(feature = "local-embeddings-fastembed")]
    model: std::sync::Arc<std::sync::Mutex<Option<fastembed::TextEmbedding>>>,
}

impl LocalEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = canonical_model_id(&config.model)?;
        if config.dims != MINILM_DIMS {
            return Err(RagError::Embedding(format!(
                "embedding.dims is {} but {} produces {}-dimensional vectors",
                config.dims, model_name, MINILM_DIMS
            )));
        }

        #[cfg(not(any(
            feature = "local-embeddings-fastembed",
            feature = "local-embeddings-tract"
        )))]
        return Err(RagError::Embedding(
            "Local embeddings require one of: --features local-embeddings-fastembed, --features local-embeddings-tract"
                .to_string(),
        ));

        #[cfg(any(
            feature = "local-embeddings-fastembed",
            feature = "local-embeddings-tract"
        ))]
        Ok(Self {
            model_name,
            dims: MINILM_DIMS,
            batch_size: config.batch_size.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
            #[cfg(feature = "local-embeddings-fastembed")]
            model: std::sync::Arc::new(std::sync::Mutex::new(None)),
        })
    }

    #[cfg(feature = "local-embeddings-fastembed")]
    fn embed_blocking(&self, texts: Vec<String>) -> impl FnOnce() -> Result<Vec<Vec<f32>>> + Send + 'static {
        let model = self.model.clone();
        let batch_size = self.batch_size;
        move || {
            let mut guard = model
                .lock()
                .map_err(|_| RagError::Embedding("embedding model lock poisoned".to_string()))?;
            if guard.is_none() {
                tracing::info!("initialising local embedding model {}", MINILM_MODEL_ID);
                let init = fastembed::TextEmbedding::try_new(
                    fastembed::InitOptions::new(fastembed::EmbeddingModel::AllMiniLML6V2)
                        .with_show_download_progress(false),
                )
                .map_err(|e| {
                    RagError::Embedding(format!(
                        "Failed to initialize local embedding model: {}",
                        e
                    ))
                })?;
                *guard = Some(init);
            }
            let embedder = guard
                .as_mut()
                .ok_or_else(|| RagError::Embedding("embedding model unavailable".to_string()))?;
            embedder
                .embed(texts, Some(batch_size))
                .map_err(|e| RagError::Embedding(format!("Local embedding failed: {}", e)))
        }
    }

    #[cfg(all(
        feature = "local-embeddings-tract",
        not(feature = "local-embeddings-fastembed")
    ))]
    fn embed_blocking(&self, texts: Vec<String>) -> impl FnOnce() -> Result<Vec<Vec<f32>>> + Send + 'static {
        let batch_size = self.batch_size;
        move || local_tract::embed_blocking(batch_size, &texts)
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_name(&self) -> &str {
        self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    #[cfg(any(
        feature = "local-embeddings-fastembed",
        feature = "local-embeddings-tract"
    ))]
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let job = tokio::task::spawn_blocking(self.embed_blocking(texts.to_vec()));
        let vectors = tokio::time::timeout(self.timeout, job)
            .await
            .map_err(|_| RagError::timeout("embedding", self.timeout.as_secs()))?
            .map_err(|e| RagError::Embedding(format!("embedding task failed: {}", e)))??;

        if vectors.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors, model returned {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }

    #[cfg(not(any(
        feature = "local-embeddings-fastembed",
        feature = "local-embeddings-tract"
    )))]
    async fn embed_texts(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Err(RagError::Embedding(
            "no local embedding backend compiled in".to_string(),
        ))
    }
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// ```rust
/// use grounded_answers::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
