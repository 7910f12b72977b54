//! LeadHarvest CLI — organization harvesting and email enrichment.
//!
//! Harvests organization profiles from a search query, hunts each
//! organization's website for a contact address and stores embedded,
//! deduplicated leads in a local libSQL database.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
