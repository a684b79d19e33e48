//! Core data types flowing through ingestion and retrieval.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Free-form record metadata. Always carries `source`.
pub type Metadata = Map<String, Value>;

/// One text-bearing record produced by a loader. PDFs yield one per page.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub text: String,
    pub metadata: Metadata,
}

impl Document {
    pub fn new(text: impl Into<String>, source: &str) -> Self {
        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), Value::String(source.to_string()));
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// A bounded window of a document's text; the unit that is embedded and
/// retrieved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    /// Position within its source document, contiguous from 0.
    pub chunk_index: i64,
    pub text: String,
    pub metadata: Metadata,
}

impl Chunk {
    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

/// A chunk returned from a nearest-neighbor query with its cosine similarity.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}
