use anyhow::{Context, Result};
use console::style;
use smartdl::{ConfigManager, DownloadManager, TracingSink, api};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub async fn handle_serve(config_manager: &ConfigManager, bind: Option<String>) -> Result<()> {
    let config = config_manager.config();
    let bind = bind.unwrap_or_else(|| config.server.bind.clone());
    let addr: SocketAddr = bind
        .parse()
        .with_context(|| format!("Invalid bind address: {}", bind))?;

    let manager = Arc::new(DownloadManager::new(
        config.download_options(),
        Arc::new(TracingSink),
    )?);
    let app = api::router(Arc::clone(&manager));

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    println!(
        "{} Serving downloads on http://{}",
        style("🚀").cyan(),
        style(addr).cyan().bold()
    );
    println!(
        "{} Files are saved to {}",
        style("📁").cyan(),
        style(manager.download_dir().display()).cyan()
    );
    info!(%addr, "http api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    // Stop transfer loops so partial files are flushed and stay resumable.
    let cancelled = manager.cancel_all().await;
    if cancelled > 0 && !manager.wait_until_settled(SHUTDOWN_GRACE).await {
        warn!("Some downloads did not stop within {:?}", SHUTDOWN_GRACE);
    }
    info!(cancelled, "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
