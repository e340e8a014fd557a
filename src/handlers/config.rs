use crate::cli::{ConfigAction, ConfigFormat};
use anyhow::{Context, Result};
use console::style;
use smartdl::ConfigManager;
use std::process;

pub async fn handle_config(config_manager: &ConfigManager, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { format } => match format {
            ConfigFormat::Toml => print!("{}", config_manager.to_toml()?),
            ConfigFormat::Json => println!(
                "{}",
                serde_json::to_string_pretty(config_manager.config())
                    .context("Failed to serialize config")?
            ),
        },
        ConfigAction::Path => {
            println!("{}", config_manager.config_file().display());
        }
        ConfigAction::Validate => match config_manager.validate() {
            Ok(()) => {
                println!(
                    "{} Configuration is valid: {}",
                    style("✅").green(),
                    config_manager.config_file().display()
                );
            }
            Err(e) => {
                eprintln!("{} Configuration is invalid: {:#}", style("❌").red(), e);
                eprintln!(
                    "💡 Edit {} and run 'smartdl config validate' again",
                    config_manager.config_file().display()
                );
                process::exit(1);
            }
        },
    }
    Ok(())
}
