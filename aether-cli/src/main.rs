//! Aether CLI - point-cloud reconstruction server

use aether_cli::cli::{Cli, Commands, handle_config_command, start_server};
use aether_cli::config::ConfigManager;
use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut manager = match cli.config {
        Some(path) => ConfigManager::load_with_path(path)?,
        None => ConfigManager::load()?,
    };

    match cli.command {
        Commands::Start { port, host } => {
            start_server(manager.config(), host, port).await?;
        }
        Commands::Config { action } => {
            handle_config_command(&mut manager, action)?;
        }
    }

    Ok(())
}
