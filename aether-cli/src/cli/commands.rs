//! CLI command definitions

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Aether point-cloud reconstruction server
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Set the log level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Configuration file (defaults to the per-user config directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Main command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start the reconstruction server
    Start {
        /// Server port (automatically finds free port if occupied)
        #[arg(short, long)]
        port: Option<u16>,

        /// Interface to bind, overriding `server.host`
        #[arg(long)]
        host: Option<String>,
    },

    /// Configuration management
    Config {
        /// Configuration action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration management operations
#[derive(Subcommand)]
pub enum ConfigAction {
    /// Get a configuration value
    Get {
        /// Configuration key, e.g. `session.chunk_size`
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key
        key: String,
        /// Configuration value
        value: String,
    },

    /// Show the effective configuration
    List {
        /// Show only specified section
        #[arg(long)]
        section: Option<String>,
    },

    /// Show configuration file location
    Path,
}
