use clap::Parser;
use adaptive_options::cli::{self, Cli, Commands};
use adaptive_options::config::AppConfig;
use adaptive_options::error::{AdaptiveError, Result};
use tracing::{error, info};

mod main_runtime;

use main_runtime::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("Config validation error: {}", e);
        }
        return Err(AdaptiveError::Validation(errors.join("; ")));
    }
    info!(config_dir = %cli.config.display(), "Configuration loaded");

    match cli.command {
        Commands::Status => cli::run_status(&config).await?,
        Commands::Demo { capital, shock, seed } => cli::run_demo(&config, capital, shock, seed).await?,
        Commands::Evaluate { bars, shock, seed } => cli::run_evaluate(&config, bars, shock, seed).await?,
    }

    Ok(())
}
