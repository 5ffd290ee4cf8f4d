//! Ingestion pipeline orchestration.
//!
//! Runs one file through read → truncate → chunk → embed → store. Chunks
//! are processed strictly one at a time. The two failure kinds are treated
//! differently:
//!
//! - an embedding failure aborts the run (later chunks would fail the same way);
//! - a store write failure is logged, the chunk counts as attempted but not
//!   succeeded, and the run moves on.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{info, warn};

use crate::chunk::{chunk_document, ChunkOptions};
use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::extract::{read_document, truncate_chars};
use crate::models::{Chunk, NewRecord};
use crate::store::{SupabaseStore, VectorStore};

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub chunk_size: usize,
    pub overlap: usize,
    pub max_chunks: Option<usize>,
    /// Characters kept from the document before chunking; `None` or `0` keeps all.
    pub max_chars: Option<usize>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        let chunking = ChunkOptions::default();
        Self {
            chunk_size: chunking.chunk_size,
            overlap: chunking.overlap,
            max_chunks: None,
            max_chars: None,
        }
    }
}

/// Outcome of a run: `succeeded <= attempted`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub attempted: usize,
    pub succeeded: usize,
}

/// Read and chunk a file. Chunk titles are the file name, sources the path.
pub fn prepare_chunks(path: &Path, options: &IngestOptions) -> Result<Vec<Chunk>> {
    let text = read_document(path)?;
    let text = match options.max_chars {
        Some(max) if max > 0 => truncate_chars(&text, max),
        _ => text.as_str(),
    };

    let title = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(chunk_document(
        &title,
        &path.display().to_string(),
        text,
        &ChunkOptions {
            chunk_size: options.chunk_size,
            overlap: options.overlap,
            max_chunks: options.max_chunks,
        },
    ))
}

/// Embed and store chunks sequentially.
pub async fn store_chunks(
    chunks: Vec<Chunk>,
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
) -> Result<IngestReport> {
    let mut report = IngestReport::default();

    for (index, chunk) in chunks.into_iter().enumerate() {
        let embedding = embedder
            .embed(&chunk.text)
            .await
            .with_context(|| format!("embedding chunk {} failed", index))?;

        report.attempted += 1;
        let record = NewRecord::from_chunk(chunk, embedding);
        match store.insert(&record).await {
            Ok(()) => report.succeeded += 1,
            Err(e) => warn!(chunk = index, error = %e, "store write failed, skipping chunk"),
        }
    }

    Ok(report)
}

/// Ingest one file into `store` using `embedder`.
pub async fn ingest_file(
    path: &Path,
    options: &IngestOptions,
    embedder: &dyn EmbeddingProvider,
    store: &dyn VectorStore,
) -> Result<IngestReport> {
    let chunks = prepare_chunks(path, options)?;
    info!(path = %path.display(), chunks = chunks.len(), "chunked document");
    store_chunks(chunks, embedder, store).await
}

/// CLI entry point for `ingest`.
pub async fn run_ingest(
    config: &Config,
    path: &Path,
    options: &IngestOptions,
    dry_run: bool,
) -> Result<()> {
    if options.chunk_size == 0 {
        anyhow::bail!("--chunk-size must be > 0");
    }

    let chunks = prepare_chunks(path, options)?;
    println!("ingest {}", path.display());
    println!("  chunks: {}", chunks.len());

    if dry_run {
        println!("  (dry-run, nothing written)");
        return Ok(());
    }

    let embedder = create_provider(&config.embedding)?;
    let store = SupabaseStore::new(&config.store)?;
    info!(model = embedder.model_name(), "embedding with provider");

    let report = store_chunks(chunks, embedder.as_ref(), &store).await?;
    println!("  ingested: {}/{}", report.succeeded, report.attempted);
    if report.succeeded < report.attempted {
        println!("  failed writes: {}", report.attempted - report.succeeded);
    }
    println!("ok");
    Ok(())
}
