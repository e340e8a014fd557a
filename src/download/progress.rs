use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use super::task::{TaskCommand, TaskId, TaskStatus};

/// Everything a task or the manager reports while it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadProgress {
    Queued {
        id: TaskId,
        url: String,
    },
    Started {
        id: TaskId,
        url: String,
        output_path: PathBuf,
        resume_offset: u64,
    },
    Progress {
        id: TaskId,
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
        progress_percent: Option<f64>,
    },
    Paused {
        id: TaskId,
    },
    Resumed {
        id: TaskId,
    },
    Completed {
        id: TaskId,
        bytes_downloaded: u64,
    },
    Failed {
        id: TaskId,
        category: &'static str,
        error: String,
    },
    Cancelled {
        id: TaskId,
    },
    /// A control command arrived while the task was in a state that cannot accept it.
    Rejected {
        id: TaskId,
        command: TaskCommand,
        status: TaskStatus,
    },
    NotFound {
        id: TaskId,
        command: TaskCommand,
    },
    Cleared {
        ids: Vec<TaskId>,
    },
}

impl DownloadProgress {
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            DownloadProgress::Queued { id, .. }
            | DownloadProgress::Started { id, .. }
            | DownloadProgress::Progress { id, .. }
            | DownloadProgress::Paused { id }
            | DownloadProgress::Resumed { id }
            | DownloadProgress::Completed { id, .. }
            | DownloadProgress::Failed { id, .. }
            | DownloadProgress::Cancelled { id }
            | DownloadProgress::Rejected { id, .. }
            | DownloadProgress::NotFound { id, .. } => Some(*id),
            DownloadProgress::Cleared { .. } => None,
        }
    }
}

/// Destination for [`DownloadProgress`] events.
///
/// The manager hands one sink to every task it creates, so the caller decides
/// where diagnostics end up: `tracing`, a channel, or nowhere.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DownloadProgress);
}

impl EventSink for mpsc::UnboundedSender<DownloadProgress> {
    fn emit(&self, event: DownloadProgress) {
        let _ = self.send(event);
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn emit(&self, _event: DownloadProgress) {}
}

/// Forwards events to the `tracing` subscriber installed by the binary.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: DownloadProgress) {
        match event {
            DownloadProgress::Queued { id, url } => info!(id, %url, "download added"),
            DownloadProgress::Started {
                id,
                output_path,
                resume_offset,
                ..
            } => {
                if resume_offset > 0 {
                    info!(
                        id,
                        path = %output_path.display(),
                        resume_offset,
                        "resuming download"
                    );
                } else {
                    info!(id, path = %output_path.display(), "download started");
                }
            }
            DownloadProgress::Progress {
                id,
                bytes_downloaded,
                total_bytes,
                ..
            } => trace!(id, bytes_downloaded, ?total_bytes, "chunk written"),
            DownloadProgress::Paused { id } => info!(id, "download paused"),
            DownloadProgress::Resumed { id } => info!(id, "download resumed"),
            DownloadProgress::Completed {
                id,
                bytes_downloaded,
            } => info!(
                id,
                size = %format_bytes(bytes_downloaded),
                "download completed"
            ),
            DownloadProgress::Failed {
                id,
                category,
                error,
            } => warn!(id, category, %error, "download failed"),
            DownloadProgress::Cancelled { id } => info!(id, "download cancelled"),
            DownloadProgress::Rejected {
                id,
                command,
                status,
            } => warn!(id, %command, %status, "command ignored"),
            DownloadProgress::NotFound { id, command } => {
                warn!(id, %command, "download not found")
            }
            DownloadProgress::Cleared { ids } => debug!(?ids, "cleared failed downloads"),
        }
    }
}

pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", size as u64, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Percentage of `downloaded` over `total`, clamped to 100.
pub fn percent_of(downloaded: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some((downloaded as f64 / total as f64 * 100.0).min(100.0))
}
