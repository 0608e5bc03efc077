mod app;
mod cli;
mod console;
mod error;
mod sites;
mod telemetry;
mod token;

use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let mut log_config = cli.logging.to_config();
    if !matches!(cli.command, Command::Sites) {
        let fallback = ProjectDirs::from("", "", "panel")
            .map(|dirs| dirs.data_local_dir().join("panel-console.log"));
        log_config = log_config.for_raw_terminal(fallback);
    }
    telemetry::init(&log_config)
        .map_err(|err| CliError::Logging(err.to_string()))
        .context("starting panel-console")?;
    tracing::debug!(target: "panel::console", level = ?log_config.level, "logging initialized");

    app::run(cli).await?;
    Ok(())
}
