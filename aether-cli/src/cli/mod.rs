//! CLI module organization

pub mod commands;
pub mod config_command;
pub mod server;

pub use commands::{Cli, Commands, ConfigAction};
pub use config_command::handle_config_command;
pub use server::{serve, shutdown_signal, start_server};
