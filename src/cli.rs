use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "smartdl")]
#[command(about = "Concurrent HTTP downloader with pause, resume and cancel")]
#[command(long_about = "
smartdl downloads files over HTTP(S) concurrently. Every download can be paused,
resumed and cancelled on its own, and a partially downloaded file is continued
with a byte-range request when the same URL is added again.

Examples:
  smartdl interactive                 # Command prompt (add, list, pause, ...)
  smartdl serve --bind 0.0.0.0:8080   # JSON API for other front ends
  smartdl -d /tmp/files interactive   # Override the download directory
  smartdl config show                 # Print the active configuration
")]
#[command(version)]
pub struct Cli {
    /// Override config file path
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the download directory
    #[arg(short, long, global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the JSON download API
    #[cfg(feature = "http")]
    Serve {
        /// Address to listen on
        #[arg(short, long, value_name = "ADDR")]
        #[arg(help = "Address to listen on (overrides server.bind)")]
        bind: Option<String>,
    },

    /// Manage downloads from an interactive prompt
    #[command(visible_alias = "i")]
    Interactive,

    /// Manage configuration
    #[command(visible_alias = "cfg")]
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Output format
        #[arg(short, long, value_enum, default_value = "toml")]
        format: ConfigFormat,
    },

    /// Print the configuration file location
    Path,

    /// Validate configuration
    #[command(visible_alias = "check")]
    Validate,
}

#[derive(clap::ValueEnum, Clone, Debug, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML format (default)
    Toml,
    /// JSON format
    Json,
}

impl std::fmt::Display for ConfigFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigFormat::Toml => write!(f, "toml"),
            ConfigFormat::Json => write!(f, "json"),
        }
    }
}

impl Cli {
    /// Validate CLI arguments and show helpful error messages
    pub fn validate(&self) -> Result<(), String> {
        if let Some(bind) = self.bind_override() {
            if bind.parse::<SocketAddr>().is_err() {
                return Err(format!(
                    "Invalid bind address '{}', expected HOST:PORT",
                    bind
                ));
            }
        }
        Ok(())
    }

    #[cfg(feature = "http")]
    fn bind_override(&self) -> Option<&str> {
        match &self.command {
            Commands::Serve { bind } => bind.as_deref(),
            _ => None,
        }
    }

    #[cfg(not(feature = "http"))]
    fn bind_override(&self) -> Option<&str> {
        None
    }
}
