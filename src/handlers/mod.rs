pub mod config;
pub mod interactive;
#[cfg(feature = "http")]
pub mod serve;

use crate::cli::{Commands, ConfigAction};

// Re-export all handlers
pub use config::handle_config;
pub use interactive::handle_interactive;
#[cfg(feature = "http")]
pub use serve::handle_serve;

/// Check if config validation should be skipped for certain commands
pub fn should_skip_config_validation(command: &Commands) -> bool {
    matches!(
        command,
        Commands::Config {
            action: ConfigAction::Validate | ConfigAction::Path
        }
    )
}
