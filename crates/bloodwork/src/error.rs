use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Not a PDF file: {0}")]
    NotPdf(PathBuf),

    #[error("Invalid PDF signature: {0}")]
    InvalidSignature(PathBuf),

    #[error("No PDF files found in {0}")]
    NoInputs(PathBuf),

    #[error("{failed} of {total} files failed to import")]
    BatchFailed { failed: usize, total: usize },
}
