//! confbot CLI: conference assistant batch runner and one-shot chat.
//!
//! Keeps the page, cleaned-content, and schedule caches fresh, and answers
//! questions from them.

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
