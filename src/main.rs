//! # grounded-answers CLI (`ga`)
//!
//! ## Usage
//!
//! ```bash
//! ga --config ./config/ga.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ga ingest` | Rebuild the index from every document in the data directory |
//! | `ga ingest --path <file>...` | Add specific files to the existing index |
//! | `ga ask "<question>"` | Answer one question |
//! | `ga chat` | Interactive question/answer session in the terminal |
//! | `ga serve` | Start the HTTP API |
//! | `ga status` | Show readiness and index size |
//!
//! The language-model key is read from the environment variable named by
//! `[llm].api_key_env` (default `GROQ_API_KEY`). Log verbosity follows
//! `RUST_LOG`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use grounded_answers::chat;
use grounded_answers::config;
use grounded_answers::embedding::Embedder;
use grounded_answers::ingest::IngestRequest;
use grounded_answers::server;
use grounded_answers::state::ServiceState;
use grounded_answers::store;

/// Answers questions over your own documents with retrieval-augmented
/// generation.
#[derive(Parser)]
#[command(
    name = "ga",
    about = "grounded-answers: question answering over private documents",
    version
)]
struct Cli {
    /// Path to configuration file (TOML). Defaults apply when it is absent.
    #[arg(long, global = true, default_value = "./config/ga.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index documents.
    ///
    /// Without `--path`, rebuilds the index from `[paths].data_dir`.
    /// With one or more `--path`, adds those files to the existing index.
    Ingest {
        /// File to add (repeatable). Must be under the allowed root.
        #[arg(long = "path")]
        paths: Vec<String>,
    },

    /// Answer a single question.
    Ask {
        question: String,
    },

    /// Interactive chat in the terminal.
    Chat,

    /// Start the HTTP API on `[server].bind`.
    Serve,

    /// Print readiness and index details.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_or_default(&cli.config)?;
    let state = ServiceState::from_config(cfg)?;

    match cli.command {
        Commands::Ingest { paths } => {
            let request = IngestRequest::from_paths(if paths.is_empty() { None } else { Some(paths) });
            let report = state.ingest(request).await?;
            println!("{}", report.message);
            if let Some(n) = report.chunks {
                println!("  chunks in index: {}", n);
            }
            if let Some(n) = report.chunks_added {
                println!("  chunks added:    {}", n);
            }
        }
        Commands::Ask { question } => {
            state.initialize().await;
            let answer = state.answer(&question).await?;
            println!("{}", answer);
        }
        Commands::Chat => {
            state.initialize().await;
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            chat::run_chat(&state, stdin, &mut std::io::stdout()).await?;
        }
        Commands::Serve => {
            state.initialize().await;
            server::run_server(Arc::new(state)).await?;
        }
        Commands::Status => {
            state.initialize().await;
            let index_dir = &state.config().paths.index_dir;
            match state.readiness().await {
                Ok(()) => println!("ready"),
                Err(reason) => println!("not ready: {}", reason),
            }
            match store::read_index(index_dir).await {
                Ok((meta, entries)) => {
                    println!("index:   {}", index_dir.display());
                    println!("  model:   {} ({} dims)", meta.model, meta.dims);
                    println!("  entries: {}", entries.len());
                }
                Err(e) => println!("index:   {}", e),
            }
            println!("embedder: {}", state.embedder().model_name());
        }
    }

    Ok(())
}
