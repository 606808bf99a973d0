//! Keepsake - keepsake command

use anyhow::Result;
use clap::Parser;
use keepsake_cli::args::Cli;
use keepsake_cli::{daemon, logging, settings};
use owo_colors::OwoColorize;
use tracing::{debug, info};

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{} {:#}", "error:".red().bold(), err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Before parsing, so clap sees the variables it defines
    let env_file = settings::load_env_file();
    let cli = Cli::parse();
    let config = settings::load(&cli)?;

    if cli.print_config {
        print!("{}", settings::render(&config)?);
        return Ok(());
    }

    let _log_guard = logging::init(cli.log_level.as_deref(), config.log_file.as_deref())?;
    if let Some(path) = env_file {
        debug!(path = %path.display(), "loaded environment file");
    }

    let stats = daemon::serve(config, daemon::shutdown_signal()).await?;
    info!(
        snapshots = stats.snapshots,
        failures = stats.failures,
        "keepsake stopped"
    );
    Ok(())
}
