//! # grounded-answers
//!
//! Question answering over a private document collection by
//! retrieval-augmented generation: relevant chunks are retrieved from a
//! local vector index and a language model composes an answer from them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────────────┐   ┌─────────────┐
//! │  data/       │──▶│  Ingest pipeline    │──▶│ vector_db/  │
//! │ PDF/HTML/JSON│   │ load→chunk→embed    │   │ index.sqlite│
//! └──────────────┘   └─────────────────────┘   └──────┬──────┘
//!                                                     │
//!                           ┌─────────────────────────┤
//!                           ▼                         ▼
//!                      ┌──────────┐             ┌──────────┐
//!                      │ RagChain │◀── state ──▶│   HTTP   │
//!                      │ top-k+LLM│             │  / CLI   │
//!                      └──────────┘             └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export GROQ_API_KEY=...
//! ga ingest                      # index everything in data/
//! ga ask "How long do I boil water?"
//! ga serve                       # HTTP API on 0.0.0.0:8193
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error kinds and their HTTP status mapping |
//! | [`models`] | Documents, chunks, scored results |
//! | [`extract`] | PDF, HTML, and JSON text extraction |
//! | [`loader`] | File and directory loading, path validation |
//! | [`chunk`] | Recursive character text splitting |
//! | [`embedding`] | Embedder trait and the local MiniLM embedder |
//! | [`store`] | SQLite persistence of the vector index |
//! | [`index`] | Exact nearest-neighbor vector index |
//! | [`ingest`] | Full and incremental ingestion pipeline |
//! | [`llm`] | Language-model client |
//! | [`rag`] | Retrieval-augmented answering chain |
//! | [`state`] | Shared service state and chain publishing |
//! | [`server`] | HTTP API |
//! | [`chat`] | Terminal chat loop |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;
pub mod models;
pub mod rag;
pub mod server;
pub mod state;
pub mod store;
