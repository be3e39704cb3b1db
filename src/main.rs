//! autoapply CLI entry point.

use clap::Parser;

use autoapply::cli::commands;
use autoapply::cli::context::load_config;
use autoapply::cli::{handle_error, Cli, Commands};
use autoapply::infrastructure::logging::LoggerImpl;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(&err, json),
    };

    let _logger = match LoggerImpl::init(&config.logging) {
        Ok(logger) => logger,
        Err(err) => handle_error(&err, json),
    };

    let result = match cli.command {
        Commands::Init(args) => commands::init::execute(args, &config, json).await,
        Commands::Task(args) => commands::task::execute(args, &config, json).await,
        Commands::Worker(args) => commands::worker::execute(args, &config, json).await,
        Commands::Domain(args) => commands::domain::execute(args, &config, json).await,
        Commands::Config(args) => commands::config::execute(args, &config, json).await,
        Commands::Job(args) => commands::job::execute(args, &config, json).await,
        Commands::Profile(args) => commands::profile::execute(args, &config, json).await,
    };

    if let Err(err) = result {
        handle_error(&err, json);
    }
}
