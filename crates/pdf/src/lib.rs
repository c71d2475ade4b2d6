//! Embedded text-layer reader for lab report PDFs.
//!
//! Turns PDF bytes into one plain-text string per page, reconstructing
//! reading order from positioned text spans. Used when no layout-preserving
//! external tool is available on the host.

use thiserror::Error;

use parser::backend::{LopdfBackend, PdfBackend};

pub mod cleanup;
pub mod parser;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("PDF parsing error: {0}")]
    Parse(String),
    #[error("Document is encrypted")]
    Encrypted,
    #[error("Missing %PDF- signature")]
    InvalidSignature,
}

const SIGNATURE: &[u8] = b"%PDF-";

/// Check for the `%PDF-` header within the first kilobyte (some producers
/// emit a few bytes of junk before it).
pub fn check_signature(bytes: &[u8]) -> Result<(), PdfError> {
    let head = &bytes[..bytes.len().min(1024)];
    if head.windows(SIGNATURE.len()).any(|w| w == SIGNATURE) {
        Ok(())
    } else {
        Err(PdfError::InvalidSignature)
    }
}

/// Extract the text of every page, in page order.
///
/// Document-level failures (unparseable file, encryption) are errors. A
/// page whose content stream cannot be decoded contributes an empty string,
/// so the result always has one entry per page.
pub fn extract_page_texts(bytes: &[u8]) -> Result<Vec<String>, PdfError> {
    check_signature(bytes)?;
    let backend = LopdfBackend::load_bytes(bytes)?;
    Ok(page_texts(&backend))
}

fn page_texts(backend: &dyn PdfBackend) -> Vec<String> {
    backend
        .pages()
        .values()
        .map(|&page_id| match parser::layout::extract_page_spans(backend, page_id) {
            Ok(spans) => cleanup::cleanup_text(&parser::layout::render_page(spans)),
            Err(_) => String::new(),
        })
        .collect()
}
