mod cli;
mod handlers;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use smartdl::ConfigManager;
use std::process;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Validate CLI arguments first
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        process::exit(1);
    }

    init_logging(args.verbose);

    let mut config_manager = match &args.config {
        Some(path) => ConfigManager::from_path(path)?,
        None => ConfigManager::new()?,
    };
    if let Some(dir) = &args.dir {
        config_manager.config_mut().general.download_dir = dir.clone();
    }

    if !handlers::should_skip_config_validation(&args.command) {
        if let Err(e) = config_manager.validate() {
            eprintln!("Configuration validation failed: {:#}", e);
            eprintln!("Run 'smartdl config validate' for details");
            process::exit(1);
        }
    }

    match args.command {
        #[cfg(feature = "http")]
        Commands::Serve { bind } => {
            handlers::handle_serve(&config_manager, bind).await?;
        }
        Commands::Interactive => {
            handlers::handle_interactive(&config_manager).await?;
        }
        Commands::Config { action } => {
            handlers::handle_config(&config_manager, action).await?;
        }
    }

    Ok(())
}

/// Logs go to stderr so they do not interleave with prompt output on stdout.
/// `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
