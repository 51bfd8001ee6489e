mod cli;
mod commands;
mod logging;
mod settings;

use anyhow::Context;
use clap::Parser;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = settings::load(cli.config.as_deref()).context("loading configuration")?;
    logging::init(&config.logging)?;
    commands::run(cli, config).await
}
