use std::path::{Path, PathBuf};

use bloodwork_core::glossary::{
    canonicalize_offline, classification_prompt, classification_schema, validate_decisions,
    Canonicalizer, ClassificationResponse, Glossary, CLASSIFICATION_MAX_TOKENS,
    CLASSIFICATION_PREAMBLE, MAX_BATCH,
};
use bloodwork_core::harvest::llm::{
    extraction_prompt, extraction_schema, rows_to_measurements, translation_prompt,
    translation_schema, ExtractionResponse, TranslationResponse, EXTRACTION_PREAMBLE,
    MAX_OUTPUT_TOKENS, TRANSLATION_MAX_TOKENS, TRANSLATION_PREAMBLE,
};
use bloodwork_core::harvest::table_like_lines;
use bloodwork_core::lab::LabMeta;
use bloodwork_core::model::{Lab, Measurement};
use bloodwork_core::pipeline::{
    apply_translations, combine, fallback_candidates, finalize, harvest_document,
    needs_translation,
};
use colored::Colorize;

use crate::extract::extract_text;
use crate::llm::{LlmClient, LlmOptions};
use crate::prelude::{eprintln, println, *};
use crate::upload::{storage_key, Uploader};

#[derive(Debug, clap::Args)]
pub struct App {
    /// PDF to import
    #[clap(conflicts_with = "all", required_unless_present = "all")]
    pub path: Option<PathBuf>,

    /// Import every PDF in the input directory
    #[clap(long)]
    pub all: bool,

    /// Keep going when a file fails and report the failures at the end
    #[clap(long, requires = "all", conflicts_with = "path")]
    pub continue_on_error: bool,

    /// Do not upload the PDF and the record
    #[clap(long)]
    pub skip_upload: bool,

    /// Directory scanned by --all
    #[clap(long, env = "BLOODWORK_INPUT_DIR", default_value = "data/pdfs")]
    pub input_dir: PathBuf,

    /// Directory for the JSON records
    #[clap(long, env = "BLOODWORK_OUTPUT_DIR", default_value = "data/labs")]
    pub output_dir: PathBuf,

    /// Object storage endpoint; files are PUT under labs/<date>/
    #[clap(long, env = "BLOODWORK_UPLOAD_URL")]
    pub upload_url: Option<String>,

    #[clap(flatten)]
    pub llm: LlmOptions,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    if app.continue_on_error && !app.all {
        return Err(eyre!("--continue-on-error requires --all"));
    }
    let files = match (&app.path, app.all) {
        (_, true) => list_pdfs(&app.input_dir)?,
        (Some(path), false) => vec![path.clone()],
        (None, false) => return Err(eyre!("Pass a PDF path or --all")),
    };
    let llm = LlmClient::from_options(&app.llm)?;
    let uploader = Uploader::from_options(app.upload_url.as_deref(), app.skip_upload);

    if global.verbose {
        eprintln!("Importing {} file(s)", files.len());
        eprintln!("Glossary: {}", global.glossary.display());
        if llm.is_some() {
            eprintln!("Models: {}", app.llm.models.join(", "));
        }
    }

    let mut failures: Vec<(PathBuf, color_eyre::eyre::Report)> = Vec::new();
    for file in &files {
        match import_file(file, &app, &global, llm.as_ref(), uploader.as_ref()).await {
            Ok(output) => println!(
                "{} {} -> {}",
                "Imported".green().bold(),
                file.display(),
                output.display()
            ),
            Err(e) if app.continue_on_error => {
                eprintln!("{} {}: {:#}", "Failed".red().bold(), file.display(), e);
                failures.push((file.clone(), e));
            }
            Err(e) => return Err(e.wrap_err(f!("Failed to import {}", file.display()))),
        }
    }

    if failures.is_empty() {
        return Ok(());
    }

    let mut table = new_table();
    table.add_row(prettytable::row!["File", "Error"]);
    for (file, e) in &failures {
        table.add_row(prettytable::row![file.display(), f!("{:#}", e)]);
    }
    table.printstd();

    Err(Error::BatchFailed {
        failed: failures.len(),
        total: files.len(),
    }
    .into())
}

/// PDFs in `dir`, sorted by file name.
pub fn list_pdfs(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .wrap_err_with(|| f!("Failed to read input directory {}", dir.display()))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_pdf_extension(path))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(Error::NoInputs(dir.to_path_buf()).into());
    }
    Ok(files)
}

fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}

/// Check that `path` is an existing `.pdf` file with a PDF signature and
/// return its bytes.
pub async fn validate_input(path: &Path) -> Result<Vec<u8>> {
    if !path.is_file() {
        return Err(Error::NotFound(path.to_path_buf()).into());
    }
    if !has_pdf_extension(path) {
        return Err(Error::NotPdf(path.to_path_buf()).into());
    }
    let bytes = tokio::fs::read(path)
        .await
        .wrap_err_with(|| f!("Failed to read {}", path.display()))?;
    if pdf::check_signature(&bytes).is_err() {
        return Err(Error::InvalidSignature(path.to_path_buf()).into());
    }
    Ok(bytes)
}

async fn import_file(
    path: &Path,
    app: &App,
    global: &crate::Global,
    llm: Option<&LlmClient>,
    uploader: Option<&Uploader>,
) -> Result<PathBuf> {
    log::info!("Importing {}", path.display());
    let bytes = validate_input(path).await?;
    let text = extract_text(path, bytes.clone()).await?;
    log::info!("Read {} pages with {}", text.pages.len(), text.source);

    let now = crate::glossary::timestamp();
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    let mut glossary = crate::glossary::load(&global.glossary, &now).await?;

    let harvest = harvest_document(&text.pages);
    let model_rows = match llm {
        Some(client) => extract_with_model(client, &text.pages).await,
        None => Vec::new(),
    };
    let mut candidates = combine(harvest, model_rows);
    if candidates.is_empty() {
        log::info!("No candidates from the primary strategies; trying fallback patterns");
        candidates = fallback_candidates(&text.full_text);
    }
    if let Some(client) = llm {
        translate_with_model(client, &mut candidates).await;
    }

    let measurements = match llm {
        Some(client) => canonicalize_with_model(client, &mut glossary, &now, candidates).await,
        None => canonicalize_offline(&mut glossary, &now, candidates),
    };
    let mut lab = finalize(LabMeta::detect(&text.full_text, &today), measurements);

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_eyre("File name is not valid UTF-8")?
        .to_string();
    if let Some(uploader) = uploader {
        let key = storage_key(&lab.date, &stem, "pdf");
        lab.import_location = uploader.put_or_warn(&key, bytes, "application/pdf").await;
    }

    let output = write_record(&app.output_dir, &stem, &lab).await?;
    if let Some(uploader) = uploader {
        let key = storage_key(&lab.date, &stem, "json");
        let body = serde_json::to_vec_pretty(&lab)?;
        uploader.put_or_warn(&key, body, "application/json").await;
    }

    crate::glossary::persist(&global.glossary, glossary, &now).await?;
    Ok(output)
}

async fn write_record(output_dir: &Path, stem: &str, lab: &Lab) -> Result<PathBuf> {
    tokio::fs::create_dir_all(output_dir)
        .await
        .wrap_err_with(|| f!("Failed to create {}", output_dir.display()))?;
    let output = output_dir.join(f!("{}.json", stem));
    tokio::fs::write(&output, serde_json::to_string_pretty(lab)?)
        .await
        .wrap_err_with(|| f!("Failed to write {}", output.display()))?;
    Ok(output)
}

/// One model call per page that has table-like lines. A failed page is
/// skipped.
async fn extract_with_model(client: &LlmClient, pages: &[String]) -> Vec<Measurement> {
    let schema = extraction_schema();
    let mut rows = Vec::new();

    for (i, page) in pages.iter().enumerate() {
        let lines = table_like_lines(page);
        if lines.is_empty() {
            continue;
        }
        let prompt = extraction_prompt(i + 1, &lines);
        match client
            .generate::<ExtractionResponse>(EXTRACTION_PREAMBLE, &prompt, &schema, MAX_OUTPUT_TOKENS)
            .await
        {
            Ok(response) => rows.extend(rows_to_measurements(response)),
            Err(e) => log::warn!("Skipping model extraction for page {}: {}", i + 1, e),
        }
    }

    log::debug!("Model extraction produced {} rows", rows.len());
    rows
}

/// Ask the model for English names where term substitution was not enough.
async fn translate_with_model(client: &LlmClient, candidates: &mut [Measurement]) {
    let pending = needs_translation(candidates);
    if pending.is_empty() {
        return;
    }
    let names: Vec<&str> = pending.iter().map(|&i| candidates[i].name.as_str()).collect();
    let prompt = translation_prompt(&names);

    match client
        .generate::<TranslationResponse>(
            TRANSLATION_PREAMBLE,
            &prompt,
            &translation_schema(),
            TRANSLATION_MAX_TOKENS,
        )
        .await
    {
        Ok(response) => apply_translations(candidates, &pending, response.translations),
        Err(e) => log::warn!("Skipping name translation: {}", e),
    }
}

/// Exact lookup first; unknown names go to the model in batches. A batch
/// whose call fails is resolved by the fallback check alone.
async fn canonicalize_with_model(
    client: &LlmClient,
    glossary: &mut Glossary,
    now: &str,
    measurements: Vec<Measurement>,
) -> Vec<Measurement> {
    let mut canonicalizer = Canonicalizer::new(glossary, now);
    let mut resolution = canonicalizer.partition(measurements);
    let pending = resolution.take_pending();
    let schema = classification_schema();

    for batch in pending.chunks(MAX_BATCH) {
        let candidates: Vec<Measurement> = batch.iter().map(|(_, m)| m.clone()).collect();
        let prompt = classification_prompt(&candidates, &canonicalizer.known_names());

        let decisions = match client
            .generate::<ClassificationResponse>(
                CLASSIFICATION_PREAMBLE,
                &prompt,
                &schema,
                CLASSIFICATION_MAX_TOKENS,
            )
            .await
        {
            Ok(response) => {
                let (decisions, errors) = validate_decisions(batch.len(), response.decisions);
                for e in errors {
                    log::debug!("Ignoring classification decision: {}", e);
                }
                decisions
            }
            Err(e) => {
                log::warn!("Classification unavailable ({}); using the fallback check", e);
                vec![None; batch.len()]
            }
        };

        for ((slot, m), decision) in batch.iter().cloned().zip(decisions) {
            let resolved = canonicalizer.apply_decision(m, decision.as_ref());
            resolution.fill(slot, resolved);
        }
    }

    resolution.into_measurements()
}
