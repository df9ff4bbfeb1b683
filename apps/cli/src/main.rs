//! PageChat CLI: chat with any web page through a PageChat backend.
//!
//! Connects to a page (index, then wait until the backend is ready) and
//! streams answers to questions about it.

mod commands;
mod terminal;

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
