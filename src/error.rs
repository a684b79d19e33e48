//! Error taxonomy shared by ingestion, answering, and the HTTP adapter.
//!
//! Validation kinds (`InvalidInput`, `InvalidRequest`, `PathNotAllowed`,
//! `UnsupportedFormat`) are always raised before any embedding or network
//! work starts. [`RagError::status`] maps each kind to the HTTP status the
//! server reports.

use std::fmt;
use std::path::PathBuf;

use axum::http::StatusCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

/// Why the answering pipeline cannot serve requests. The three
/// preconditions are checked independently and reported distinctly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotReadyReason {
    MissingCredentials { env_var: String },
    MissingIndex { index_dir: PathBuf },
    LoadFailed(String),
}

impl fmt::Display for NotReadyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotReadyReason::MissingCredentials { env_var } => write!(
                f,
                "{} is not set. Export it (or add it to your environment) with your language-model API key.",
                env_var
            ),
            NotReadyReason::MissingIndex { index_dir } => write!(
                f,
                "{} not found. Run ingestion once (`ga ingest` or POST /ingest) to index your documents.",
                index_dir.display()
            ),
            NotReadyReason::LoadFailed(cause) => {
                write!(f, "RAG chain failed to load: {}", cause)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("unsupported file format: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("path not allowed: {} ({reason})", .path.display())]
    PathNotAllowed { path: PathBuf, reason: String },

    #[error("vector index not found at {}: {reason}", .path.display())]
    IndexNotFound { path: PathBuf, reason: String },

    #[error("no documents loaded: {0}")]
    NoDocuments(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("service not ready: {0}")]
    NotReady(NotReadyReason),

    #[error("Error generating response: {0}")]
    GenerationFailed(String),

    #[error("embedding model mismatch: index was built with '{index_model}', embedder is '{embedder_model}'")]
    EmbeddingModelMismatch {
        index_model: String,
        embedder_model: String,
    },

    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    #[error("failed to extract text from {}: {message}", .path.display())]
    Extraction { path: PathBuf, message: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector index error: {0}")]
    Index(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn path_not_allowed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::PathNotAllowed {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn index_not_found(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::IndexNotFound {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn extraction(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Extraction {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            secs,
        }
    }

    /// HTTP status class for this error kind.
    pub fn status(&self) -> StatusCode {
        match self {
            RagError::InvalidInput(_)
            | RagError::InvalidRequest(_)
            | RagError::PathNotAllowed { .. }
            | RagError::UnsupportedFormat(_)
            | RagError::NoDocuments(_) => StatusCode::BAD_REQUEST,
            RagError::NotFound(_) | RagError::IndexNotFound { .. } => StatusCode::NOT_FOUND,
            RagError::NotReady(_) => StatusCode::SERVICE_UNAVAILABLE,
            RagError::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            RagError::GenerationFailed(_)
            | RagError::EmbeddingModelMismatch { .. }
            | RagError::Extraction { .. }
            | RagError::Embedding(_)
            | RagError::Index(_)
            | RagError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::InvalidInput(_)
            | RagError::InvalidRequest(_)
            | RagError::UnsupportedFormat(_)
            | RagError::NoDocuments(_) => "bad_request",
            RagError::PathNotAllowed { .. } => "path_not_allowed",
            RagError::NotFound(_) | RagError::IndexNotFound { .. } => "not_found",
            RagError::NotReady(_) => "not_ready",
            RagError::Timeout { .. } => "timeout",
            RagError::GenerationFailed(_) => "generation_failed",
            RagError::EmbeddingModelMismatch { .. } => "embedding_model_mismatch",
            RagError::Extraction { .. }
            | RagError::Embedding(_)
            | RagError::Index(_)
            | RagError::Io(_) => "internal",
        }
    }
}

impl From<sqlx::Error> for RagError {
    fn from(err: sqlx::Error) -> Self {
        RagError::Index(err.to_string())
    }
}

impl From<serde_json::Error> for RagError {
    fn from(err: serde_json::Error) -> Self {
        RagError::Index(format!("metadata encoding: {}", err))
    }
}
