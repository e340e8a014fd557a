#[cfg(feature = "http")]
pub mod api;
pub mod config;
pub mod download;

// Re-export commonly used types for easier access in tests
pub use config::{Config, ConfigManager};
pub use download::{
    ControlOutcome, DownloadError, DownloadManager, DownloadOptions, DownloadProgress,
    DownloadTask, EventSink, NoopSink, TaskId, TaskSnapshot, TaskStatus, TracingSink,
};
