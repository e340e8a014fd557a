//! JSON-over-HTTP front end for a [`DownloadManager`].
//!
//! Every handler is a thin translation of one manager call; the router keeps
//! no state beyond the shared manager.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::download::{ControlOutcome, DownloadManager, TaskCommand, TaskId, TaskSnapshot};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartRequest {
    pub url: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TaskRequest {
    pub id: TaskId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub id: TaskId,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearResponse {
    pub removed: Vec<TaskId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type SharedManager = Arc<DownloadManager>;

pub fn router(manager: SharedManager) -> Router {
    Router::new()
        .route("/start-download", post(start_download))
        .route("/download-status", get(download_status))
        .route("/download-status/{id}", get(download_status_one))
        .route("/pause-download", post(pause_download))
        .route("/resume-download", post(resume_download))
        .route("/cancel-download", post(cancel_download))
        .route("/clear-finished", post(clear_finished))
        .with_state(manager)
}

async fn start_download(
    State(manager): State<SharedManager>,
    Json(request): Json<StartRequest>,
) -> Response {
    let url = request.url.trim();
    if url.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "url must not be empty".to_string(),
            }),
        )
            .into_response();
    }

    let id = manager.add_download(url).await;
    debug!(id, url, "download started over http");
    Json(CommandResponse {
        id,
        message: format!("Download started successfully with ID {}", id),
    })
    .into_response()
}

async fn download_status(State(manager): State<SharedManager>) -> Json<Vec<TaskSnapshot>> {
    Json(manager.list_statuses().await)
}

async fn download_status_one(
    State(manager): State<SharedManager>,
    Path(id): Path<TaskId>,
) -> Response {
    match manager.get(id).await {
        Some(snapshot) => Json(snapshot).into_response(),
        None => not_found(id),
    }
}

async fn pause_download(
    State(manager): State<SharedManager>,
    Json(request): Json<TaskRequest>,
) -> Response {
    let outcome = manager.pause(request.id).await;
    command_response(request.id, TaskCommand::Pause, outcome)
}

async fn resume_download(
    State(manager): State<SharedManager>,
    Json(request): Json<TaskRequest>,
) -> Response {
    let outcome = manager.resume(request.id).await;
    command_response(request.id, TaskCommand::Resume, outcome)
}

async fn cancel_download(
    State(manager): State<SharedManager>,
    Json(request): Json<TaskRequest>,
) -> Response {
    let outcome = manager.cancel(request.id).await;
    command_response(request.id, TaskCommand::Cancel, outcome)
}

async fn clear_finished(State(manager): State<SharedManager>) -> Json<ClearResponse> {
    Json(ClearResponse {
        removed: manager.clear_errored().await,
    })
}

fn command_response(id: TaskId, command: TaskCommand, outcome: ControlOutcome) -> Response {
    match outcome {
        ControlOutcome::Applied => {
            let verb = match command {
                TaskCommand::Pause => "paused",
                TaskCommand::Resume => "resumed",
                TaskCommand::Cancel => "cancelled",
            };
            Json(CommandResponse {
                id,
                message: format!("Download {} {} successfully", id, verb),
            })
            .into_response()
        }
        ControlOutcome::Ignored(status) => (
            StatusCode::CONFLICT,
            Json(CommandResponse {
                id,
                message: format!("Cannot {} download {}: it is {}", command, id, status),
            }),
        )
            .into_response(),
        ControlOutcome::NotFound => not_found(id),
    }
}

fn not_found(id: TaskId) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(CommandResponse {
            id,
            message: format!("Download ID {} not found", id),
        }),
    )
        .into_response()
}
