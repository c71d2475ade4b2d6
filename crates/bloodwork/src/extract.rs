use std::fmt;
use std::path::{Path, PathBuf};

use crate::prelude::{eprintln, println, *};

#[derive(Debug, clap::Args)]
pub struct App {
    /// Path to the PDF file
    pub path: PathBuf,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let bytes = crate::import::validate_input(&app.path).await?;
    let text = extract_text(&app.path, bytes).await?;

    if global.verbose {
        eprintln!("Extracted {} pages with {}", text.pages.len(), text.source);
    }
    for (i, page) in text.pages.iter().enumerate() {
        println!("--- page {} ---\n{}", i + 1, page);
    }

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSource {
    Pdftotext,
    EmbeddedText,
}

impl fmt::Display for TextSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextSource::Pdftotext => f.write_str("pdftotext"),
            TextSource::EmbeddedText => f.write_str("embedded text layer"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub full_text: String,
    pub pages: Vec<String>,
    pub source: TextSource,
}

impl ExtractedText {
    fn new(pages: Vec<String>, source: TextSource) -> Self {
        Self {
            full_text: pages.join("\n"),
            pages,
            source,
        }
    }
}

/// Split `pdftotext` output into pages. The form feed after the last page
/// does not start a new one.
pub fn split_pages(output: &str) -> Vec<String> {
    let mut pages: Vec<String> = output.split('\x0c').map(str::to_string).collect();
    if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
        pages.pop();
    }
    pages
}

async fn run_pdftotext(path: &Path) -> Result<Vec<String>> {
    let binary = which::which("pdftotext").map_err(|e| eyre!("pdftotext not available: {}", e))?;

    let output = tokio::process::Command::new(binary)
        .args(["-layout", "-enc", "UTF-8"])
        .arg(path)
        .arg("-")
        .output()
        .await
        .wrap_err("Failed to run pdftotext")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(eyre!(
            "pdftotext exited with {}: {}",
            output.status,
            stderr.trim()
        ));
    }

    Ok(split_pages(&String::from_utf8_lossy(&output.stdout)))
}

/// Page text for a PDF: `pdftotext -layout` when it is installed and
/// produces text, otherwise the embedded text layer.
pub async fn extract_text(path: &Path, bytes: Vec<u8>) -> Result<ExtractedText> {
    match run_pdftotext(path).await {
        Ok(pages) if pages.iter().any(|p| !p.trim().is_empty()) => {
            log::debug!("Extracted {} pages with pdftotext", pages.len());
            return Ok(ExtractedText::new(pages, TextSource::Pdftotext));
        }
        Ok(_) => log::warn!("pdftotext produced no text for {}", path.display()),
        Err(e) => log::warn!("{}; reading the embedded text layer", e),
    }

    let pages = tokio::task::spawn_blocking(move || pdf::extract_page_texts(&bytes))
        .await
        .wrap_err("Text extraction task failed")?
        .map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?;

    log::debug!("Extracted {} pages from the text layer", pages.len());
    Ok(ExtractedText::new(pages, TextSource::EmbeddedText))
}
