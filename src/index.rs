//! In-memory vector index with exact nearest-neighbor search.
//!
//! Entries keep insertion order. A query scores every entry by cosine
//! similarity and returns the best `k`, highest first; equal scores keep
//! insertion order, so results are deterministic for a fixed index and
//! query vector.
//!
//! Every index is tagged with the identifier of the embedding model that
//! produced its vectors. [`VectorIndex::load`] refuses an index built by a
//! different model instead of silently mixing embedding spaces.

use std::path::Path;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::{RagError, Result};
use crate::models::{Chunk, ScoredChunk};
use crate::store::{self, StoredEntry};

#[derive(Debug, Clone)]
pub struct VectorIndex {
    model: String,
    dims: usize,
    entries: Vec<StoredEntry>,
}

impl VectorIndex {
    /// An empty index for `model` vectors of length `dims`.
    pub fn new(model: impl Into<String>, dims: usize) -> Self {
        Self {
            model: model.into(),
            dims,
            entries: Vec::new(),
        }
    }

    /// An empty index matching `embedder`.
    pub fn for_embedder(embedder: &dyn Embedder) -> Self {
        Self::new(embedder.model_name(), embedder.dims())
    }

    /// Embeds `chunks` and returns a fresh index holding exactly them.
    pub async fn build(chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<Self> {
        let mut index = Self::for_embedder(embedder);
        index.add(chunks, embedder).await?;
        Ok(index)
    }

    /// Loads the index persisted at `dir`, checking that it was built by
    /// `embedder`'s model.
    pub async fn load(dir: &Path, embedder: &dyn Embedder) -> Result<Self> {
        let (meta, entries) = store::read_index(dir).await?;
        if meta.model != embedder.model_name() || meta.dims != embedder.dims() {
            return Err(RagError::EmbeddingModelMismatch {
                index_model: format!("{} ({} dims)", meta.model, meta.dims),
                embedder_model: format!("{} ({} dims)", embedder.model_name(), embedder.dims()),
            });
        }
        tracing::debug!(dir = %dir.display(), entries = entries.len(), "index loaded");
        Ok(Self {
            model: meta.model,
            dims: meta.dims,
            entries,
        })
    }

    /// Loads the index at `dir`, or starts an empty one when nothing has
    /// been persisted there yet. An existing but unreadable index is an
    /// error, never silently replaced.
    pub async fn load_or_create(dir: &Path, embedder: &dyn Embedder) -> Result<Self> {
        if !dir.exists() {
            tracing::info!("{} does not exist yet, starting an empty index", dir.display());
            return Ok(Self::for_embedder(embedder));
        }
        Self::load(dir, embedder).await
    }

    /// Embeds and appends `chunks`, returning how many were added.
    pub async fn add(&mut self, chunks: Vec<Chunk>, embedder: &dyn Embedder) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }
        if embedder.model_name() != self.model {
            return Err(RagError::EmbeddingModelMismatch {
                index_model: self.model.clone(),
                embedder_model: embedder.model_name().to_string(),
            });
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embedder.embed_texts(&texts).await?;
        self.add_embedded(chunks, vectors)
    }

    /// Appends chunks with precomputed vectors. Nothing is added unless
    /// every vector has the index's dimension.
    pub fn add_embedded(&mut self, chunks: Vec<Chunk>, vectors: Vec<Vec<f32>>) -> Result<usize> {
        if chunks.len() != vectors.len() {
            return Err(RagError::Index(format!(
                "{} chunks but {} vectors",
                chunks.len(),
                vectors.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|v| v.len() != self.dims) {
            return Err(RagError::Index(format!(
                "vector has {} dimensions, index expects {}",
                bad.len(),
                self.dims
            )));
        }

        let added = chunks.len();
        self.entries.extend(
            chunks
                .into_iter()
                .zip(vectors)
                .map(|(chunk, vector)| StoredEntry { chunk, vector }),
        );
        Ok(added)
    }

    /// Persists the index to `dir`, replacing whatever was there.
    pub async fn save(&self, dir: &Path) -> Result<()> {
        store::write_index(dir, &self.model, self.dims, &self.entries).await
    }

    /// Up to `k` entries nearest to `vector`, closest first.
    pub fn query(&self, vector: &[f32], k: usize) -> Vec<ScoredChunk> {
        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (i, cosine_similarity(vector, &e.vector)))
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].chunk.clone(),
                score,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|e| &e.chunk)
    }
}
