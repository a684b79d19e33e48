//! Shared service state.
//!
//! One [`ServiceState`] is built per process and handed to every consumer
//! (HTTP handlers, the terminal chat, CLI commands). It owns the current
//! [`RagChain`], which is built off to the side and then published with a
//! single swap, so a reader always sees either the previous chain or the
//! new one.
//!
//! Ingest calls are serialised: the ingest lock is held across the
//! pipeline run, the chain rebuild, and the publish.

use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::config::Config;
use crate::embedding::{Embedder, LocalEmbedder};
use crate::error::{NotReadyReason, RagError, Result};
use crate::ingest::{IngestPipeline, IngestReport, IngestRequest};
use crate::llm::{ChatCompletionsClient, LanguageModel};
use crate::rag::RagChain;
use crate::store;

#[derive(Default)]
struct ChainSlot {
    chain: Option<Arc<RagChain>>,
    last_error: Option<NotReadyReason>,
}

pub struct ServiceState {
    config: Config,
    embedder: Arc<dyn Embedder>,
    /// `None` when no language-model credential is configured.
    llm: Option<Arc<dyn LanguageModel>>,
    slot: RwLock<ChainSlot>,
    ingest_lock: Mutex<()>,
}

impl ServiceState {
    pub fn new(
        config: Config,
        embedder: Arc<dyn Embedder>,
        llm: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        Self {
            config,
            embedder,
            llm,
            slot: RwLock::new(ChainSlot::default()),
            ingest_lock: Mutex::new(()),
        }
    }

    /// Builds the production state: the local embedder and the
    /// chat-completions client. A missing credential is not an error here;
    /// it is reported by [`ServiceState::readiness`].
    pub fn from_config(config: Config) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::new(LocalEmbedder::new(&config.embedding)?);
        let llm: Option<Arc<dyn LanguageModel>> =
            match ChatCompletionsClient::from_config(&config.llm) {
                Ok(client) => Some(Arc::new(client)),
                Err(RagError::NotReady(reason)) => {
                    tracing::warn!("{}", reason);
                    None
                }
                Err(e) => return Err(e),
            };
        Ok(Self::new(config, embedder, llm))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedder(&self) -> &dyn Embedder {
        self.embedder.as_ref()
    }

    /// Best-effort startup load. Failure is logged and later reported as
    /// not-ready; it never aborts startup.
    pub async fn initialize(&self) {
        if let Err(e) = self.reload().await {
            tracing::warn!("Answering chain failed to load at startup: {}", e);
        }
    }

    /// Checks the three preconditions for answering, in order: credential,
    /// persisted index, loaded chain.
    pub async fn readiness(&self) -> std::result::Result<(), NotReadyReason> {
        if self.llm.is_none() {
            return Err(NotReadyReason::MissingCredentials {
                env_var: self.config.llm.api_key_env.clone(),
            });
        }
        let index_dir = &self.config.paths.index_dir;
        if !store::index_exists(index_dir) {
            return Err(NotReadyReason::MissingIndex {
                index_dir: index_dir.clone(),
            });
        }

        let slot = self.slot.read().await;
        if slot.chain.is_some() {
            return Ok(());
        }
        match &slot.last_error {
            Some(reason @ NotReadyReason::LoadFailed(_)) => Err(reason.clone()),
            // The index appeared after the last load attempt.
            _ => Err(NotReadyReason::LoadFailed(
                "an index exists but has not been loaded; run ingestion through this service or restart it"
                    .to_string(),
            )),
        }
    }

    /// Rebuilds the chain from the persisted index and publishes it.
    ///
    /// On failure the current chain is dropped and the reason recorded,
    /// so readiness reflects what is on disk. Returns the entry count of
    /// the published index.
    pub async fn reload(&self) -> Result<usize> {
        let built = self.build_chain().await;
        let mut slot = self.slot.write().await;
        match built {
            Ok(chain) => {
                let entries = chain.index_len();
                slot.chain = Some(Arc::new(chain));
                slot.last_error = None;
                tracing::info!(entries, "answering chain published");
                Ok(entries)
            }
            Err(reason) => {
                slot.chain = None;
                slot.last_error = Some(reason.clone());
                Err(RagError::NotReady(reason))
            }
        }
    }

    async fn build_chain(&self) -> std::result::Result<RagChain, NotReadyReason> {
        let llm = self
            .llm
            .clone()
            .ok_or_else(|| NotReadyReason::MissingCredentials {
                env_var: self.config.llm.api_key_env.clone(),
            })?;
        let index_dir = &self.config.paths.index_dir;
        if !store::index_exists(index_dir) {
            return Err(NotReadyReason::MissingIndex {
                index_dir: index_dir.clone(),
            });
        }
        RagChain::load(&self.config, self.embedder.clone(), llm)
            .await
            .map_err(|e| NotReadyReason::LoadFailed(e.to_string()))
    }

    /// The published chain, if any.
    pub async fn chain(&self) -> Option<Arc<RagChain>> {
        self.slot.read().await.chain.clone()
    }

    /// Answers one question. Blank input is rejected before readiness is
    /// even checked.
    pub async fn answer(&self, question: &str) -> Result<String> {
        if question.trim().is_empty() {
            return Err(RagError::InvalidInput(
                "'message' cannot be blank.".to_string(),
            ));
        }
        let chain = match self.chain().await {
            Some(chain) => chain,
            None => {
                let reason = match self.readiness().await {
                    Err(reason) => reason,
                    Ok(()) => NotReadyReason::LoadFailed("answering chain not loaded".to_string()),
                };
                return Err(RagError::NotReady(reason));
            }
        };
        chain.answer(question).await
    }

    /// Runs an ingest and, if it succeeds, rebuilds and publishes the
    /// chain before returning.
    ///
    /// A failed rebuild does not fail the ingest: the index was written,
    /// and the rebuild failure shows up through [`ServiceState::readiness`].
    pub async fn ingest(&self, request: IngestRequest) -> Result<IngestReport> {
        let _guard = self.ingest_lock.lock().await;

        let mut pipeline = IngestPipeline::new(&self.config, self.embedder.as_ref());
        let report = pipeline.run(request).await?;

        if let Err(e) = self.reload().await {
            tracing::warn!("Index written but the answering chain could not be rebuilt: {}", e);
        }
        Ok(report)
    }
}
