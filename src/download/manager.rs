use anyhow::{Context, Result};
use reqwest::Client;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::task::ActiveFiles;
use super::{
    DownloadOptions, DownloadProgress, DownloadTask, EventSink, TaskCommand, TaskId,
    TaskSnapshot, TaskStatus,
};

const SETTLE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What happened to a pause, resume or cancel command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    Applied,
    /// The task exists but its state does not accept the command.
    Ignored(TaskStatus),
    NotFound,
}

struct Registry {
    tasks: BTreeMap<TaskId, Arc<DownloadTask>>,
    next_id: TaskId,
}

/// Owns every download of one process run.
///
/// Id allocation and registration happen under one lock, so concurrent adds
/// never lose or duplicate an entry. Commands look a task up under that lock
/// and then talk to the task after releasing it, so a busy task never holds
/// up the registry.
pub struct DownloadManager {
    registry: Mutex<Registry>,
    download_dir: PathBuf,
    active_files: ActiveFiles,
    client: Client,
    events: Arc<dyn EventSink>,
}

impl DownloadManager {
    pub fn new(options: DownloadOptions, events: Arc<dyn EventSink>) -> Result<Self> {
        std::fs::create_dir_all(&options.output_directory).with_context(|| {
            format!(
                "Failed to create download directory: {:?}",
                options.output_directory
            )
        })?;
        let client = options.build_client()?;

        Ok(Self {
            registry: Mutex::new(Registry {
                tasks: BTreeMap::new(),
                next_id: 1,
            }),
            download_dir: options.output_directory,
            active_files: ActiveFiles::default(),
            client,
            events,
        })
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// Register a download and start it in the background. Returns as soon as
    /// the task is registered; failures show up later as the task's `Error`
    /// status.
    pub async fn add_download(&self, url: &str) -> TaskId {
        let task = {
            let mut registry = self.registry.lock().await;
            let id = registry.next_id;
            registry.next_id += 1;

            let task = Arc::new(
                DownloadTask::new(
                    id,
                    url,
                    self.download_dir.clone(),
                    Arc::clone(&self.events),
                )
                .with_active_files(Arc::clone(&self.active_files)),
            );
            registry.tasks.insert(id, Arc::clone(&task));
            task
        };

        let id = task.id();
        self.events.emit(DownloadProgress::Queued {
            id,
            url: url.to_string(),
        });
        tokio::spawn(task.run(self.client.clone()));
        id
    }

    pub async fn pause(&self, id: TaskId) -> ControlOutcome {
        self.dispatch(id, TaskCommand::Pause).await
    }

    pub async fn resume(&self, id: TaskId) -> ControlOutcome {
        self.dispatch(id, TaskCommand::Resume).await
    }

    pub async fn cancel(&self, id: TaskId) -> ControlOutcome {
        self.dispatch(id, TaskCommand::Cancel).await
    }

    /// Snapshot of every task in ascending id order.
    pub async fn list_statuses(&self) -> Vec<TaskSnapshot> {
        let registry = self.registry.lock().await;
        registry.tasks.values().map(|task| task.snapshot()).collect()
    }

    pub async fn get(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.task(id).await.map(|task| task.snapshot())
    }

    /// Drop every task whose status is `Error`. Completed and cancelled tasks
    /// stay listed. Returns the removed ids.
    pub async fn clear_errored(&self) -> Vec<TaskId> {
        let removed = {
            let mut registry = self.registry.lock().await;
            let errored: Vec<TaskId> = registry
                .tasks
                .iter()
                .filter(|(_, task)| task.status() == TaskStatus::Error)
                .map(|(id, _)| *id)
                .collect();
            for id in &errored {
                registry.tasks.remove(id);
            }
            errored
        };

        if !removed.is_empty() {
            self.events.emit(DownloadProgress::Cleared {
                ids: removed.clone(),
            });
        }
        removed
    }

    /// Cancel every task that has not finished yet. Returns how many were
    /// signalled.
    pub async fn cancel_all(&self) -> usize {
        let active: Vec<Arc<DownloadTask>> = {
            let registry = self.registry.lock().await;
            registry
                .tasks
                .values()
                .filter(|task| !task.status().is_terminal())
                .cloned()
                .collect()
        };
        active.iter().filter(|task| task.cancel()).count()
    }

    /// Wait until every task is in a terminal state. Returns `false` if the
    /// timeout elapsed first.
    pub async fn wait_until_settled(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, async {
            loop {
                let settled = {
                    let registry = self.registry.lock().await;
                    registry.tasks.values().all(|task| task.status().is_terminal())
                };
                if settled {
                    return;
                }
                tokio::time::sleep(SETTLE_POLL_INTERVAL).await;
            }
        })
        .await
        .is_ok()
    }

    pub async fn len(&self) -> usize {
        self.registry.lock().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.registry.lock().await.tasks.is_empty()
    }

    async fn task(&self, id: TaskId) -> Option<Arc<DownloadTask>> {
        self.registry.lock().await.tasks.get(&id).cloned()
    }

    async fn dispatch(&self, id: TaskId, command: TaskCommand) -> ControlOutcome {
        let Some(task) = self.task(id).await else {
            self.events.emit(DownloadProgress::NotFound { id, command });
            return ControlOutcome::NotFound;
        };

        let applied = match command {
            TaskCommand::Pause => task.pause(),
            TaskCommand::Resume => task.resume(),
            TaskCommand::Cancel => task.cancel(),
        };

        if applied {
            ControlOutcome::Applied
        } else {
            ControlOutcome::Ignored(task.status())
        }
    }
}
