//! Shared fixtures: a deterministic embedder, a scripted language model,
//! and a throwaway project layout.
#![allow(dead_code)]

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

use grounded_answers::config::Config;
use grounded_answers::embedding::Embedder;
use grounded_answers::error::{RagError, Result};
use grounded_answers::llm::LanguageModel;
use grounded_answers::state::ServiceState;

pub const DIMS: usize = 256;

/// Bag-of-words hashing embedder. Same text, same vector; texts sharing
/// words point in similar directions.
pub struct HashEmbedder {
    name: String,
}

impl HashEmbedder {
    pub fn new() -> Self {
        Self::named("test-hash-embedder")
    }

    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    fn embed_one(text: &str) -> Vec<f32> {
        let mut v = vec![0f32; DIMS];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut h: u64 = 0xcbf29ce484222325;
            for b in word.to_lowercase().bytes() {
                h ^= b as u64;
                h = h.wrapping_mul(0x100000001b3);
            }
            v[(h % DIMS as u64) as usize] += 1.0;
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| Self::embed_one(t)).collect())
    }
}

/// Embeds like [`HashEmbedder`] but only after sleeping for `delay`.
pub struct StalledEmbedder {
    inner: HashEmbedder,
    delay: Duration,
}

impl StalledEmbedder {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: HashEmbedder::new(),
            delay,
        }
    }
}

#[async_trait]
impl Embedder for StalledEmbedder {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        tokio::time::sleep(self.delay).await;
        self.inner.embed_texts(texts).await
    }
}

/// Returns a fixed reply (or a fixed failure) and records every prompt.
pub struct ScriptedModel {
    reply: std::result::Result<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(cause: &str) -> Self {
        Self {
            reply: Err(cause.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply
            .clone()
            .map_err(RagError::GenerationFailed)
    }
}

/// A temporary project root with `data/` and a config pointing into it.
pub struct Project {
    pub tmp: TempDir,
    pub config: Config,
}

impl Project {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().to_path_buf();
        fs::create_dir_all(root.join("data")).unwrap();

        let mut config = Config::default();
        config.paths.data_dir = root.join("data");
        config.paths.index_dir = root.join("vector_db");
        config.paths.allowed_root = Some(root.clone());

        Self { tmp, config }
    }

    pub fn root(&self) -> &Path {
        self.tmp.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.config.paths.data_dir.clone()
    }

    pub fn index_dir(&self) -> PathBuf {
        self.config.paths.index_dir.clone()
    }

    /// Writes `name` under the project root and returns its path.
    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> PathBuf {
        let path = self.root().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(&path, contents).unwrap();
        path
    }

    pub fn state(&self, llm: Option<Arc<ScriptedModel>>) -> Arc<ServiceState> {
        let llm = llm.map(|m| m as Arc<dyn LanguageModel>);
        Arc::new(ServiceState::new(
            self.config.clone(),
            Arc::new(HashEmbedder::new()),
            llm,
        ))
    }
}

/// One paragraph of just under 900 characters of words unique to `topic`
/// and `n`. Two never fit in one 1000-character chunk, so an HTML page of
/// `k` such paragraphs splits into exactly `k` chunks.
pub fn paragraph(topic: &str, n: usize) -> String {
    let mut out = String::new();
    let mut i = 0;
    loop {
        let word = format!("{}{}w{}", topic, n, i);
        if out.len() + word.len() + 1 > 880 {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(&word);
        i += 1;
    }
    out
}

/// An HTML page with `paragraphs` long paragraphs about `topic`.
pub fn html_page(topic: &str, paragraphs: usize) -> String {
    let body: String = (0..paragraphs)
        .map(|n| format!("<p>{}</p>\n", paragraph(topic, n)))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body>\n{}</body></html>",
        topic, body
    )
}

/// Single-page PDF whose content stream draws `phrase`.
pub fn minimal_pdf(phrase: &str) -> Vec<u8> {
    let stream = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj << /Type /Pages /Kids [3 0 R] /Count 1 >> endobj\n");
    let o3 = out.len();
    out.extend_from_slice(b"3 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >> endobj\n");
    let o4 = out.len();
    out.extend_from_slice(
        format!(
            "4 0 obj << /Length {} >> stream\n{}\nendstream endobj\n",
            stream.len(),
            stream
        )
        .as_bytes(),
    );
    let o5 = out.len();
    out.extend_from_slice(
        b"5 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );
    let xref_start = out.len();
    out.extend_from_slice(b"xref\n0 6\n");
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in [o1, o2, o3, o4, o5] {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(b"trailer << /Size 6 /Root 1 0 R >>\nstartxref\n");
    out.extend_from_slice(format!("{}\n", xref_start).as_bytes());
    out.extend_from_slice(b"%%EOF\n");
    out
}
