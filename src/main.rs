//! # grounded-chat CLI
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `grounded-chat ingest --file <path>` | Chunk, embed and store one document |
//! | `grounded-chat serve` | Start the chat HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Preview how a PDF will be split
//! grounded-chat ingest --file ./docs/guide.pdf --dry-run
//!
//! # Ingest the first 20k characters in 500-char chunks
//! grounded-chat ingest --file ./notes.md --chunk-size 500 --overlap 50 --max-chars 20000
//!
//! # Serve with a config file
//! grounded-chat --config ./config/chat.toml serve
//! ```
//!
//! Settings are read from the optional `--config` TOML file, then from the
//! environment (`.env.local` and `.env` are loaded first when present).

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use grounded_chat::{config, ingest, server};

#[derive(Parser)]
#[command(
    name = "grounded-chat",
    about = "Retrieval-augmented chat server and document ingester",
    version
)]
struct Cli {
    /// Path to an optional configuration file (TOML).
    ///
    /// Environment variables override values from this file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one text or PDF file into the vector store.
    ///
    /// Chunks are embedded and written one at a time. A failed write skips
    /// that chunk; a failed embedding stops the run.
    Ingest {
        /// File to ingest (`.pdf` is extracted, anything else read as text).
        #[arg(long)]
        file: PathBuf,

        /// Chunk size in characters (defaults to `chunking.chunk_size`).
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Characters shared by consecutive chunks (defaults to `chunking.overlap`).
        #[arg(long)]
        overlap: Option<usize>,

        /// Stop after this many chunks.
        #[arg(long)]
        max_chunks: Option<usize>,

        /// Only keep this many characters of the document (0 keeps all).
        #[arg(long)]
        max_chars: Option<usize>,

        /// Print the chunk count without embedding or writing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Start the chat HTTP server.
    Serve {
        /// Address to bind, overriding `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::from_filename(".env.local").ok();
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let mut cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Ingest {
            file,
            chunk_size,
            overlap,
            max_chunks,
            max_chars,
            dry_run,
        } => {
            let options = ingest::IngestOptions {
                chunk_size: chunk_size.unwrap_or(cfg.chunking.chunk_size),
                overlap: overlap.unwrap_or(cfg.chunking.overlap),
                max_chunks,
                max_chars,
            };
            ingest::run_ingest(&cfg, &file, &options, dry_run).await?;
        }
        Commands::Serve { bind } => {
            if let Some(bind) = bind {
                cfg.server.bind = bind;
            }
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
