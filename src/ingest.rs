//! Ingestion pipeline orchestration.
//!
//! Drives documents through loading → chunking → embedding → indexing.
//! Two modes:
//!
//! - **Full**: scans `[paths].data_dir` (soft per-file failures), builds a
//!   fresh index, and replaces whatever was persisted before. Nothing is
//!   written unless at least one chunk was produced.
//! - **Incremental**: loads an explicit path list (the first bad path
//!   fails the call), embeds the new chunks, and appends them to the
//!   existing index, creating it if needed.
//!
//! Any failure after loading aborts the call without touching the
//! persisted index. The whole call runs under `[ingest].timeout_secs`.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::chunk::TextSplitter;
use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::loader;
use crate::models::{Chunk, Document};

/// Where a pipeline run currently is. `Failed` is reachable from every
/// other stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Idle,
    Loading,
    Chunking,
    Embedding,
    Indexing,
    Done,
    Failed,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IngestStage::Idle => "idle",
            IngestStage::Loading => "loading",
            IngestStage::Chunking => "chunking",
            IngestStage::Embedding => "embedding",
            IngestStage::Indexing => "indexing",
            IngestStage::Done => "done",
            IngestStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Body of an ingest call. Absent or empty `paths` means a full ingest.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub paths: Option<Vec<String>>,
}

impl IngestRequest {
    pub fn from_paths(paths: Option<Vec<String>>) -> Self {
        Self { paths }
    }

    pub fn full() -> Self {
        Self { paths: None }
    }

    pub fn is_full(&self) -> bool {
        self.paths.as_ref().map(|p| p.is_empty()).unwrap_or(true)
    }
}

/// Outcome of a successful run. Full ingests report the index size;
/// incremental ingests report only what they added.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestReport {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunks_added: Option<usize>,
}

pub struct IngestPipeline<'a> {
    config: &'a Config,
    embedder: &'a dyn Embedder,
    splitter: TextSplitter,
    stage: IngestStage,
}

impl<'a> IngestPipeline<'a> {
    pub fn new(config: &'a Config, embedder: &'a dyn Embedder) -> Self {
        Self {
            config,
            embedder,
            splitter: TextSplitter::from_config(&config.chunking),
            stage: IngestStage::Idle,
        }
    }

    pub fn stage(&self) -> IngestStage {
        self.stage
    }

    /// Runs a full or incremental ingest depending on `request`.
    pub async fn run(&mut self, request: IngestRequest) -> Result<IngestReport> {
        match request.paths {
            Some(paths) if !paths.is_empty() => self.run_incremental(&paths).await,
            _ => self.run_full().await,
        }
    }

    /// Rebuilds the index from everything in the data directory.
    pub async fn run_full(&mut self) -> Result<IngestReport> {
        let limit = self.config.ingest.timeout();
        let result = match tokio::time::timeout(limit, self.full()).await {
            Ok(result) => result,
            Err(_) => Err(RagError::timeout("ingest", limit.as_secs())),
        };
        self.finish(result)
    }

    /// Adds the documents at `paths` to the existing index.
    pub async fn run_incremental(&mut self, paths: &[String]) -> Result<IngestReport> {
        if paths.is_empty() {
            let err = RagError::InvalidRequest(
                "incremental ingest needs at least one path".to_string(),
            );
            return self.finish(Err(err));
        }
        let limit = self.config.ingest.timeout();
        let result = match tokio::time::timeout(limit, self.incremental(paths)).await {
            Ok(result) => result,
            Err(_) => Err(RagError::timeout("ingest", limit.as_secs())),
        };
        self.finish(result)
    }

    async fn full(&mut self) -> Result<IngestReport> {
        self.enter(IngestStage::Loading);
        let data_dir = self.config.paths.data_dir.clone();
        let scan_dir = data_dir.clone();
        let documents = tokio::task::spawn_blocking(move || loader::load_directory(&scan_dir))
            .await
            .map_err(join_error)?;
        if documents.is_empty() {
            return Err(RagError::NoDocuments(format!(
                "no .html, .pdf, or .json documents could be loaded from {}",
                data_dir.display()
            )));
        }

        let chunks = self.chunk(&documents, &data_dir)?;
        let vectors = self.embed(&chunks).await?;

        self.enter(IngestStage::Indexing);
        let mut index = VectorIndex::for_embedder(self.embedder);
        index.add_embedded(chunks, vectors)?;
        index.save(&self.config.paths.index_dir).await?;

        let total = index.len();
        tracing::info!(
            documents = documents.len(),
            chunks = total,
            index = %self.config.paths.index_dir.display(),
            "full ingest complete"
        );
        Ok(IngestReport {
            message: format!(
                "Full ingest complete: indexed {} chunks from {} documents",
                total,
                documents.len()
            ),
            chunks: Some(total),
            chunks_added: None,
        })
    }

    async fn incremental(&mut self, paths: &[String]) -> Result<IngestReport> {
        self.enter(IngestStage::Loading);
        let allowed_root = self
            .config
            .paths
            .allowed_root()
            .map_err(|e| RagError::Io(std::io::Error::other(format!("{:#}", e))))?;
        let requested = paths.to_vec();
        let root = allowed_root.clone();
        let documents =
            tokio::task::spawn_blocking(move || loader::load_paths(&requested, &root))
                .await
                .map_err(join_error)??;
        if documents.is_empty() {
            return Err(RagError::NoDocuments(format!(
                "none of the {} requested paths produced a document",
                paths.len()
            )));
        }

        let chunks = self.chunk(&documents, &allowed_root)?;
        let vectors = self.embed(&chunks).await?;

        self.enter(IngestStage::Indexing);
        let index_dir = &self.config.paths.index_dir;
        let mut index = VectorIndex::load_or_create(index_dir, self.embedder).await?;
        let added = index.add_embedded(chunks, vectors)?;
        index.save(index_dir).await?;

        tracing::info!(
            paths = paths.len(),
            chunks_added = added,
            total = index.len(),
            "incremental ingest complete"
        );
        Ok(IngestReport {
            message: format!(
                "Incremental ingest complete: added {} chunks from {} paths",
                added,
                paths.len()
            ),
            chunks: None,
            chunks_added: Some(added),
        })
    }

    fn chunk(&mut self, documents: &[Document], origin: &Path) -> Result<Vec<Chunk>> {
        self.enter(IngestStage::Chunking);
        let chunks = self.splitter.split_documents(documents);
        if chunks.is_empty() {
            return Err(RagError::NoDocuments(format!(
                "{} documents from {} contain no extractable text",
                documents.len(),
                origin.display()
            )));
        }
        tracing::debug!(documents = documents.len(), chunks = chunks.len(), "chunked");
        Ok(chunks)
    }

    async fn embed(&mut self, chunks: &[Chunk]) -> Result<Vec<Vec<f32>>> {
        self.enter(IngestStage::Embedding);
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        self.embedder.embed_texts(&texts).await
    }

    fn enter(&mut self, next: IngestStage) {
        tracing::info!(from = %self.stage, to = %next, "ingest stage");
        self.stage = next;
    }

    fn finish(&mut self, result: Result<IngestReport>) -> Result<IngestReport> {
        match &result {
            Ok(_) => self.enter(IngestStage::Done),
            Err(e) => {
                tracing::warn!(stage = %self.stage, "ingest failed: {}", e);
                self.enter(IngestStage::Failed);
            }
        }
        result
    }
}

fn join_error(e: tokio::task::JoinError) -> RagError {
    RagError::Io(std::io::Error::other(format!("loader task failed: {}", e)))
}
