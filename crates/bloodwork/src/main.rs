use crate::prelude::*;
use clap::Parser;

mod error;
mod extract;
mod glossary;
mod import;
mod llm;
mod prelude;
mod upload;

#[derive(Debug, clap::Parser)]
#[command(
    author,
    version,
    about,
    long_about = "Import laboratory report PDFs into structured blood test records"
)]
pub struct App {
    #[command(subcommand)]
    pub command: SubCommands,

    #[clap(flatten)]
    global: Global,
}

#[derive(Debug, Clone, clap::Args)]
pub struct Global {
    /// Glossary file shared by every import
    #[clap(
        long,
        env = "BLOODWORK_GLOSSARY",
        global = true,
        default_value = "data/glossary.json"
    )]
    glossary: std::path::PathBuf,

    /// Whether to display additional information.
    #[clap(long, env = "BLOODWORK_VERBOSE", global = true, default_value = "false")]
    verbose: bool,
}

#[derive(Debug, clap::Parser)]
pub enum SubCommands {
    /// Import lab report PDFs into JSON records
    Import(crate::import::App),

    /// Inspect or maintain the analyte glossary
    Glossary(crate::glossary::App),

    /// Print the text extracted from a PDF, page by page
    Text(crate::extract::App),
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    color_eyre::install()?;

    let app = App::parse();

    match app.command {
        SubCommands::Import(sub_app) => crate::import::run(sub_app, app.global).await,
        SubCommands::Glossary(sub_app) => crate::glossary::run(sub_app, app.global).await,
        SubCommands::Text(sub_app) => crate::extract::run(sub_app, app.global).await,
    }
    .map_err(|err: color_eyre::eyre::Report| eyre!(err))
}
