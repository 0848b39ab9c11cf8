//! Projection import tool
//!
//! Reads `.env`, loads the configuration, sets up logging and runs one
//! command against the projection database.

mod cli;
mod io;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;
use projection_loader::LoaderConfig;
use tracing::{error, info};

use cli::{Cli, CliHandler};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = LoaderConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    logging::initialize_logging(level, format)?;

    info!("projection-import v{}", env!("CARGO_PKG_VERSION"));
    let handler = CliHandler::new(config).await?;
    if let Err(e) = handler.handle_command(cli.command).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}
