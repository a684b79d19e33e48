//! Retrieval-augmented answering.
//!
//! A [`RagChain`] binds a loaded [`VectorIndex`], the embedder that built
//! it, a language model, and the retrieval depth. It is immutable once
//! built; picking up a new index means building a new chain.
//!
//! Answering a question:
//!
//! 1. reject blank input;
//! 2. embed the question and take the `top_k` nearest chunks;
//! 3. join their text, closest first, into the prompt's context;
//! 4. call the language model once and return its text unmodified.

use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::llm::LanguageModel;
use crate::models::ScoredChunk;

const PROMPT_TEMPLATE: &str = "Use the following context to answer the question. \
Answer only from the context. If the context does not contain the answer, say \"I don't know\".

Context:
{context}

Question: {question}

Answer:";

/// Fills the prompt template in one pass, so placeholder-like text inside
/// the retrieved context or the question is left as written.
pub fn build_prompt(context: &str, question: &str) -> String {
    let mut prompt =
        String::with_capacity(PROMPT_TEMPLATE.len() + context.len() + question.len());
    let mut rest = PROMPT_TEMPLATE;
    while let Some(start) = rest.find('{') {
        prompt.push_str(&rest[..start]);
        let tail = &rest[start..];
        if let Some(after) = tail.strip_prefix("{context}") {
            prompt.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            prompt.push_str(question);
            rest = after;
        } else {
            prompt.push('{');
            rest = &tail[1..];
        }
    }
    prompt.push_str(rest);
    prompt
}

pub struct RagChain {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LanguageModel>,
    top_k: usize,
    timeout: Duration,
}

impl RagChain {
    /// Loads the persisted index and binds it to `embedder` and `llm`.
    ///
    /// Fails with `IndexNotFound` when nothing has been ingested yet and
    /// with `EmbeddingModelMismatch` when the index was built by another
    /// model.
    pub async fn load(
        config: &Config,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let index = VectorIndex::load(&config.paths.index_dir, embedder.as_ref()).await?;
        tracing::info!(
            entries = index.len(),
            model = llm.model_name(),
            "answering chain loaded"
        );
        Ok(Self::from_index(
            index,
            embedder,
            llm,
            config.retrieval.top_k,
            config.llm.timeout(),
        ))
    }

    pub fn from_index(
        index: VectorIndex,
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LanguageModel>,
        top_k: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            embedder,
            llm,
            top_k: top_k.max(1),
            timeout,
        }
    }

    pub fn index_len(&self) -> usize {
        self.index.len()
    }

    /// The `top_k` chunks nearest to `question`, closest first.
    pub async fn retrieve(&self, question: &str) -> Result<Vec<ScoredChunk>> {
        let vector = self.embedder.embed_query(question).await?;
        Ok(self.index.query(&vector, self.top_k))
    }

    pub async fn answer(&self, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidInput(
                "question cannot be blank".to_string(),
            ));
        }

        match tokio::time::timeout(self.timeout, self.generate(question)).await {
            Ok(result) => result,
            Err(_) => Err(RagError::timeout("answer generation", self.timeout.as_secs())),
        }
    }

    async fn generate(&self, question: &str) -> Result<String> {
        let hits = self.retrieve(question).await.map_err(as_generation_failure)?;
        tracing::debug!(
            hits = hits.len(),
            top_score = hits.first().map(|h| h.score),
            "retrieved context"
        );

        let context = hits
            .iter()
            .map(|h| h.chunk.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = build_prompt(&context, question);

        self.llm
            .complete(&prompt)
            .await
            .map_err(as_generation_failure)
    }
}

/// Everything that goes wrong while answering is a generation failure,
/// except timeouts which keep their own kind.
fn as_generation_failure(err: RagError) -> RagError {
    match err {
        RagError::GenerationFailed(_) | RagError::Timeout { .. } => err,
        other => RagError::GenerationFailed(other.to_string()),
    }
}
