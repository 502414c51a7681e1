//! Engage CLI entry point

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info};

use engage_cli::{cli::Cli, commands::CommandDispatcher, config::AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose);

    let config = load_configuration(&cli).context("Failed to load configuration")?;
    debug!(identity = ?config.identity, "Configuration loaded");

    CommandDispatcher::execute(cli, config)
        .await
        .context("Command execution failed")?;

    Ok(())
}

/// Logs go to stderr so command output on stdout stays machine-readable
fn setup_logging(verbose: bool) {
    let log_level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

/// Load configuration from the given file, or from defaults and `engage.toml`
fn load_configuration(cli: &Cli) -> engage_cli::Result<AppConfig> {
    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path);
            AppConfig::load_from_file(path)?
        }
        None => AppConfig::load()?,
    };
    Ok(config)
}
