use std::path::Path;

use bloodwork_core::glossary::Glossary;
use chrono::{SecondsFormat, Utc};
use colored::Colorize;

use crate::prelude::{println, *};

#[derive(Debug, clap::Parser)]
#[command(name = "glossary")]
#[command(about = "Inspect or maintain the analyte glossary")]
pub struct App {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, clap::Subcommand)]
pub enum Commands {
    /// Print every canonical name with its aliases and unit hints
    #[clap(name = "show")]
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Renormalize the glossary file in place
    #[clap(name = "normalize")]
    Normalize,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let now = timestamp();
    match app.command {
        Commands::Show { json } => {
            let glossary = load(&global.glossary, &now).await?;
            if json {
                println!("{}", glossary.to_json_pretty()?);
            } else {
                print_table(&glossary);
            }
            Ok(())
        }
        Commands::Normalize => {
            let glossary = load(&global.glossary, &now).await?;
            let before = glossary.len();
            let glossary = persist(&global.glossary, glossary, &now).await?;
            println!(
                "{} {} entries ({} before)",
                "Normalized".green().bold(),
                glossary.len(),
                before
            );
            Ok(())
        }
    }
}

/// Current time in the form stored in the glossary.
pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Read the glossary at `path`. A missing or unparseable file starts an
/// empty glossary; other read errors are returned.
pub async fn load(path: &Path, now: &str) -> Result<Glossary> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::info!("No glossary at {}; starting empty", path.display());
            return Ok(Glossary::empty(now));
        }
        Err(e) => {
            return Err(e).wrap_err_with(|| f!("Failed to read glossary {}", path.display()))
        }
    };

    match Glossary::from_json(&raw) {
        Ok(glossary) => {
            log::debug!("Loaded {} glossary entries", glossary.len());
            Ok(glossary)
        }
        Err(e) => {
            log::warn!(
                "Glossary {} is unreadable ({}); starting empty",
                path.display(),
                e
            );
            Ok(Glossary::empty(now))
        }
    }
}

/// Renormalize and write the glossary. The file is replaced through a
/// sibling temporary file so a crash never leaves half a glossary behind.
/// Concurrent writers are not coordinated.
pub async fn persist(path: &Path, glossary: Glossary, now: &str) -> Result<Glossary> {
    let glossary = glossary.renormalize(now);
    let json = glossary.to_json_pretty()?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .wrap_err_with(|| f!("Failed to create {}", parent.display()))?;
    }
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .wrap_err_with(|| f!("Failed to write {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .wrap_err_with(|| f!("Failed to replace {}", path.display()))?;

    log::debug!("Wrote {} glossary entries to {}", glossary.len(), path.display());
    Ok(glossary)
}

fn print_table(glossary: &Glossary) {
    if glossary.is_empty() {
        println!("The glossary is empty.");
        return;
    }
    let mut table = new_table();
    table.add_row(prettytable::row!["Name", "Aliases", "Units", "Ranges"]);
    for entry in &glossary.entries {
        table.add_row(prettytable::row![
            entry.canonical_name.bold(),
            entry.aliases.join(", "),
            entry.unit_hints.join(", "),
            entry.known_ranges.len()
        ]);
    }
    table.printstd();
    println!("{} entries, updated {}", glossary.len(), glossary.updated_at);
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloodwork_core::glossary::GlossaryEntry;

    const NOW: &str = "2024-05-01T10:00:00Z";

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let glossary = load(&dir.path().join("glossary.json"), NOW).await.unwrap();
        assert!(glossary.is_empty());
        assert_eq!(glossary.updated_at, NOW);
    }

    #[tokio::test]
    async fn test_unparseable_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glossary.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(load(&path, NOW).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_persist_renormalizes_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("glossary.json");

        let mut glossary = Glossary::empty("2024-01-01T00:00:00Z");
        let mut glucose = GlossaryEntry::new("Glucose", "2024-01-01T00:00:00Z");
        glucose.add_alias("Blutzucker");
        glossary.entries.push(glucose);
        glossary
            .entries
            .push(GlossaryEntry::new("Glukose", "2024-02-01T00:00:00Z"));

        let written = persist(&path, glossary, NOW).await.unwrap();
        assert_eq!(written.len(), 1);
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = load(&path, NOW).await.unwrap();
        assert_eq!(loaded, written);
        assert_eq!(loaded.updated_at, NOW);
        assert!(loaded.entries[0].aliases.contains(&"Glukose".to_string()));
    }
}
