//! Tracesift CLI entry point.

use anyhow::Context;
use clap::Parser;

use tracesift::cli::{Cli, Commands};
use tracesift::infrastructure::logging::{LogConfig, LoggerImpl};
use tracesift::ConfigLoader;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    };
    let config = match config {
        Ok(config) => config,
        Err(err) => tracesift::cli::handle_error(err, cli.json),
    };

    let logger = LogConfig::try_from(&config.logging)
        .map(|mut log_config| {
            if let Some(level) = &cli.log_level {
                log_config.level.clone_from(level);
            }
            log_config
        })
        .and_then(|log_config| LoggerImpl::init(&log_config))
        .context("Failed to initialize logging");
    let _logger = match logger {
        Ok(logger) => logger,
        Err(err) => tracesift::cli::handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Discover(args) => {
            tracesift::cli::commands::discover::execute(args, config, cli.json).await
        }
        Commands::Report(args) => {
            tracesift::cli::commands::report::execute(args, config, cli.json).await
        }
    };

    if let Err(err) = result {
        tracesift::cli::handle_error(err, cli.json);
    }
}
