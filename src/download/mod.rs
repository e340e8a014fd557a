pub mod error;
pub mod manager;
pub mod progress;
pub mod task;

pub use error::DownloadError;
pub use manager::{ControlOutcome, DownloadManager};
pub use progress::{DownloadProgress, EventSink, NoopSink, TracingSink};
pub use task::{DownloadTask, TaskCommand, TaskId, TaskSnapshot, TaskStatus};

use anyhow::{Context, Result};
use reqwest::Client;
use std::path::PathBuf;
use std::time::Duration;

/// Size of each body read in the transfer loop.
pub const CHUNK_SIZE: usize = 32 * 1024;

pub const DEFAULT_USER_AGENT: &str = concat!("smartdl/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub output_directory: PathBuf,
    pub user_agent: String,
    /// `None` leaves connection setup unbounded, like the body reads.
    pub connect_timeout: Option<Duration>,
}

impl DownloadOptions {
    pub fn new(output_directory: impl Into<PathBuf>) -> Self {
        Self {
            output_directory: output_directory.into(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            connect_timeout: None,
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub(crate) fn build_client(&self) -> Result<Client> {
        let mut builder = Client::builder().user_agent(&self.user_agent);
        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        builder.build().context("Failed to create HTTP client")
    }
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self::new("downloads")
    }
}
