use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use parking_lot::Mutex;
use reqwest::header::RANGE;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::Notify;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::progress::percent_of;
use super::{CHUNK_SIZE, DownloadError, DownloadProgress, EventSink};

pub type TaskId = u64;

/// Destination paths currently written by a live task, shared by every task
/// of one manager.
pub type ActiveFiles = Arc<Mutex<HashSet<PathBuf>>>;

/// Exclusive hold on a destination path. Released on drop.
#[derive(Debug)]
struct FileClaim {
    active: ActiveFiles,
    path: PathBuf,
}

impl FileClaim {
    fn acquire(active: &ActiveFiles, path: &Path) -> Result<Self, DownloadError> {
        if !active.lock().insert(path.to_path_buf()) {
            return Err(DownloadError::DestinationBusy {
                path: path.to_path_buf(),
            });
        }
        Ok(Self {
            active: Arc::clone(active),
            path: path.to_path_buf(),
        })
    }
}

impl Drop for FileClaim {
    fn drop(&mut self) {
        self.active.lock().remove(&self.path);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TaskStatus {
    Queued,
    Downloading,
    Paused,
    Completed,
    Error,
    Canceled,
}

impl TaskStatus {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Canceled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "Queued",
            TaskStatus::Downloading => "Downloading",
            TaskStatus::Paused => "Paused",
            TaskStatus::Completed => "Completed",
            TaskStatus::Error => "Error",
            TaskStatus::Canceled => "Canceled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskCommand {
    Pause,
    Resume,
    Cancel,
}

impl fmt::Display for TaskCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskCommand::Pause => write!(f, "pause"),
            TaskCommand::Resume => write!(f, "resume"),
            TaskCommand::Cancel => write!(f, "cancel"),
        }
    }
}

/// Point-in-time copy of a task, detached from the live task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub url: String,
    pub progress: f64,
    pub status: TaskStatus,
    pub downloaded_bytes: u64,
    /// `None` while unknown, e.g. the server sent no content length.
    pub total_bytes: Option<u64>,
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    progress: f64,
    downloaded: u64,
    total: Option<u64>,
    pause_requested: bool,
    output_path: Option<PathBuf>,
    error: Option<String>,
}

enum Outcome {
    Completed(u64),
    Cancelled,
}

/// One tracked file transfer.
///
/// Status, progress and the pause flag live behind a single lock so readers
/// always see a consistent pair. The transfer loop in [`DownloadTask::run`] is
/// the only writer of progress; control commands only flip the pause flag or
/// fire the cancellation token.
pub struct DownloadTask {
    id: TaskId,
    url: String,
    download_dir: PathBuf,
    created_at: DateTime<Utc>,
    state: Mutex<TaskState>,
    resume_signal: Notify,
    cancel_token: CancellationToken,
    active_files: ActiveFiles,
    events: Arc<dyn EventSink>,
}

impl fmt::Debug for DownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadTask")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("download_dir", &self.download_dir)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

impl DownloadTask {
    pub fn new(
        id: TaskId,
        url: impl Into<String>,
        download_dir: impl Into<PathBuf>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            id,
            url: url.into(),
            download_dir: download_dir.into(),
            created_at: Utc::now(),
            state: Mutex::new(TaskState {
                status: TaskStatus::Queued,
                progress: 0.0,
                downloaded: 0,
                total: None,
                pause_requested: false,
                output_path: None,
                error: None,
            }),
            resume_signal: Notify::new(),
            cancel_token: CancellationToken::new(),
            active_files: ActiveFiles::default(),
            events,
        }
    }

    /// Share the set of claimed destination paths with sibling tasks, so two
    /// live tasks never write the same file.
    pub fn with_active_files(mut self, active_files: ActiveFiles) -> Self {
        self.active_files = active_files;
        self
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> TaskStatus {
        self.state.lock().status
    }

    pub fn progress(&self) -> f64 {
        self.state.lock().progress
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.lock();
        TaskSnapshot {
            id: self.id,
            url: self.url.clone(),
            progress: state.progress,
            status: state.status,
            downloaded_bytes: state.downloaded,
            total_bytes: state.total,
            file_name: state
                .output_path
                .as_deref()
                .and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned()),
            error: state.error.clone(),
            created_at: self.created_at,
        }
    }

    /// Drive the transfer to a terminal state. Called once by the manager on
    /// its own tokio task; later calls return immediately.
    pub async fn run(self: Arc<Self>, client: Client) {
        {
            let mut state = self.state.lock();
            if state.status != TaskStatus::Queued {
                return;
            }
            state.status = TaskStatus::Downloading;
        }

        let result = if self.cancel_token.is_cancelled() {
            Ok(Outcome::Cancelled)
        } else {
            self.transfer(&client).await
        };

        match result {
            Ok(Outcome::Completed(bytes_downloaded)) => {
                {
                    let mut state = self.state.lock();
                    state.progress = 100.0;
                    state.status = TaskStatus::Completed;
                }
                self.events.emit(DownloadProgress::Completed {
                    id: self.id,
                    bytes_downloaded,
                });
            }
            Ok(Outcome::Cancelled) => {
                {
                    let mut state = self.state.lock();
                    state.pause_requested = false;
                    state.status = TaskStatus::Canceled;
                }
                self.events.emit(DownloadProgress::Cancelled { id: self.id });
            }
            Err(err) => {
                let message = err.to_string();
                {
                    let mut state = self.state.lock();
                    state.pause_requested = false;
                    state.status = TaskStatus::Error;
                    state.error = Some(message.clone());
                }
                self.events.emit(DownloadProgress::Failed {
                    id: self.id,
                    category: err.category(),
                    error: message,
                });
            }
        }
    }

    /// Ask the transfer loop to park before its next chunk.
    /// Returns `false` when the task is not downloading.
    pub fn pause(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != TaskStatus::Downloading {
            let status = state.status;
            drop(state);
            self.reject(TaskCommand::Pause, status);
            return false;
        }
        state.pause_requested = true;
        true
    }

    /// Wake a parked transfer loop. Returns `false` unless the task is paused.
    pub fn resume(&self) -> bool {
        let mut state = self.state.lock();
        if state.status != TaskStatus::Paused {
            let status = state.status;
            drop(state);
            self.reject(TaskCommand::Resume, status);
            return false;
        }
        state.pause_requested = false;
        drop(state);
        // notify_one keeps a permit if the loop has not parked yet.
        self.resume_signal.notify_one();
        true
    }

    /// Fire the cancellation token. The loop commits `Canceled` the next time
    /// it reaches an await point. Returns `false` for finished tasks.
    pub fn cancel(&self) -> bool {
        let status = self.status();
        if status.is_terminal() {
            self.reject(TaskCommand::Cancel, status);
            return false;
        }
        self.cancel_token.cancel();
        true
    }

    fn reject(&self, command: TaskCommand, status: TaskStatus) {
        self.events.emit(DownloadProgress::Rejected {
            id: self.id,
            command,
            status,
        });
    }

    async fn transfer(&self, client: &Client) -> Result<Outcome, DownloadError> {
        let url = Url::parse(&self.url).map_err(|source| DownloadError::InvalidUrl {
            url: self.url.clone(),
            source,
        })?;
        let output_path = self.download_dir.join(file_name_from_url(&url));
        let _claim = FileClaim::acquire(&self.active_files, &output_path)?;
        let (mut file, mut resume_offset) = open_destination(&output_path).await?;
        self.state.lock().output_path = Some(output_path.clone());

        let mut request = client.get(url);
        if resume_offset > 0 {
            request = request.header(RANGE, format!("bytes={}-", resume_offset));
        }

        let response = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => return Ok(Outcome::Cancelled),
            response = request.send() => response.map_err(|source| DownloadError::Request {
                url: self.url.clone(),
                source,
            })?,
        };

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::PARTIAL_CONTENT {
            return Err(DownloadError::Status {
                url: self.url.clone(),
                status,
            });
        }

        // The server ignored the range and is sending the whole body again.
        if resume_offset > 0 && status == StatusCode::OK {
            file.set_len(0).await.map_err(|source| DownloadError::Write {
                path: output_path.clone(),
                source,
            })?;
            resume_offset = 0;
        }

        let total = response.content_length().map(|len| len + resume_offset);
        {
            let mut state = self.state.lock();
            state.downloaded = resume_offset;
            state.total = total;
            if let Some(percent) = total.and_then(|total| percent_of(resume_offset, total)) {
                state.progress = percent;
            }
        }
        self.events.emit(DownloadProgress::Started {
            id: self.id,
            url: self.url.clone(),
            output_path: output_path.clone(),
            resume_offset,
        });

        let body = StreamReader::new(response.bytes_stream().map_err(io::Error::other));
        tokio::pin!(body);

        let outcome = self
            .copy_body(&mut body, &mut file, &output_path, resume_offset, total)
            .await;
        // Pending writes must land before the handle is dropped, or a later
        // resume could measure a short file.
        let flushed = file.flush().await.map_err(|source| DownloadError::Write {
            path: output_path.clone(),
            source,
        });
        let outcome = outcome?;
        flushed?;
        Ok(outcome)
    }

    async fn copy_body<R>(
        &self,
        body: &mut R,
        file: &mut File,
        output_path: &Path,
        mut downloaded: u64,
        total: Option<u64>,
    ) -> Result<Outcome, DownloadError>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            if self.cancel_token.is_cancelled() || !self.wait_while_paused().await {
                return Ok(Outcome::Cancelled);
            }

            let read = tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => return Ok(Outcome::Cancelled),
                read = body.read(&mut buf) => read.map_err(DownloadError::Read)?,
            };
            if read == 0 {
                return Ok(Outcome::Completed(downloaded));
            }

            file.write_all(&buf[..read])
                .await
                .map_err(|source| DownloadError::Write {
                    path: output_path.to_path_buf(),
                    source,
                })?;
            downloaded += read as u64;
            self.record_progress(downloaded, total);
        }
    }

    /// Park while a pause is requested. Returns `false` if the task was
    /// cancelled while parked.
    async fn wait_while_paused(&self) -> bool {
        let mut parked = false;
        loop {
            let resumed = self.resume_signal.notified();
            tokio::pin!(resumed);
            resumed.as_mut().enable();

            {
                let mut state = self.state.lock();
                if !state.pause_requested {
                    if parked {
                        state.status = TaskStatus::Downloading;
                    }
                    break;
                }
                state.status = TaskStatus::Paused;
            }

            if !parked {
                parked = true;
                self.events.emit(DownloadProgress::Paused { id: self.id });
            }

            tokio::select! {
                biased;
                _ = self.cancel_token.cancelled() => return false,
                _ = &mut resumed => {}
            }
        }

        if parked {
            self.events.emit(DownloadProgress::Resumed { id: self.id });
        }
        true
    }

    fn record_progress(&self, downloaded: u64, total: Option<u64>) {
        let percent = total.and_then(|total| percent_of(downloaded, total));
        {
            let mut state = self.state.lock();
            state.downloaded = downloaded;
            if let Some(percent) = percent {
                state.progress = percent;
            }
        }
        self.events.emit(DownloadProgress::Progress {
            id: self.id,
            bytes_downloaded: downloaded,
            total_bytes: total,
            progress_percent: percent,
        });
    }
}

/// Local file name for a URL: its last path segment, or `download` when the
/// path ends in a slash.
pub fn file_name_from_url(url: &Url) -> String {
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|segment| !segment.is_empty())
        .unwrap_or("download")
        .to_string()
}

/// Open `path` for appending, returning the handle and the number of bytes
/// already present.
async fn open_destination(path: &Path) -> Result<(File, u64), DownloadError> {
    let setup = |source: io::Error| DownloadError::Setup {
        path: path.to_path_buf(),
        source,
    };

    match tokio::fs::metadata(path).await {
        Ok(_) => {
            let file = OpenOptions::new()
                .append(true)
                .open(path)
                .await
                .map_err(setup)?;
            let existing = file.metadata().await.map_err(setup)?.len();
            Ok((file, existing))
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            let file = File::create(path).await.map_err(setup)?;
            Ok((file, 0))
        }
        Err(err) => Err(setup(err)),
    }
}
