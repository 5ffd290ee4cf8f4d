//! Document reading for ingestion.
//!
//! PDF files go through text extraction; every other file is read as UTF-8.

use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// True when the path has a `.pdf` extension (any case).
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

/// Read a document's text, dispatching on its extension.
pub fn read_document(path: &Path) -> Result<String, ExtractError> {
    let io_err = |source| ExtractError::Io {
        path: path.display().to_string(),
        source,
    };

    if is_pdf(path) {
        let bytes = std::fs::read(path).map_err(io_err)?;
        extract_pdf(&bytes)
    } else {
        std::fs::read_to_string(path).map_err(io_err)
    }
}

/// Extract plain text from PDF bytes.
pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Keep at most `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}
