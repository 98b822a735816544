//! `aether config` subcommands

use anyhow::{Result, anyhow};

use super::ConfigAction;
use crate::config::{ConfigManager, format_sections};

/// Runs one configuration action against `manager`, persisting on `set`.
///
/// # Errors
///
/// Returns an error for unknown keys or sections, values that fail
/// validation, or a config file that cannot be written.
pub fn handle_config_command(manager: &mut ConfigManager, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Get { key } => {
            let value = manager
                .get(&key)
                .ok_or_else(|| anyhow!("unknown configuration key: {key}"))?;
            println!("{value}");
        }
        ConfigAction::Set { key, value } => {
            manager.set(&key, &value)?;
            manager.save()?;
            println!("Updated {key} = {value}");
            println!("Saved to {}", manager.path().display());
        }
        ConfigAction::List { section } => {
            for line in format_sections(manager.config(), section.as_deref())? {
                println!("{line}");
            }
        }
        ConfigAction::Path => {
            println!("{}", manager.path().display());
        }
    }
    Ok(())
}
