use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Failure that ends a single transfer. Never escapes the task: it is
/// rendered into the task's `Error` status and reported to the event sink.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to open {}: {source}", path.display())]
    Setup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{} is already being downloaded by another task", path.display())]
    DestinationBusy { path: PathBuf },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server returned {status} for {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to read response body: {0}")]
    Read(#[source] io::Error),

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DownloadError {
    /// Which stage of the transfer failed.
    pub fn category(&self) -> &'static str {
        match self {
            DownloadError::Setup { .. } | DownloadError::DestinationBusy { .. } => "setup",
            DownloadError::InvalidUrl { .. } | DownloadError::Request { .. } => "request",
            DownloadError::Status { .. } => "protocol",
            DownloadError::Read(_) | DownloadError::Write { .. } => "transfer",
        }
    }
}
