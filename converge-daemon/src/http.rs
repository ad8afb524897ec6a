//! HTTP control surface.
//!
//! Handlers only enqueue triggers or read the status board. They never wait
//! on a reconciliation pass.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use converge_core::ProjectName;

use crate::status::{ProjectStatus, StatusBoard};
use crate::trigger::{Delivery, TriggerBroadcaster};

#[derive(Clone)]
pub struct AppState {
    pub broadcaster: Arc<TriggerBroadcaster>,
    pub status: StatusBoard,
    pub version: String,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(broadcaster: Arc<TriggerBroadcaster>, status: StatusBoard) -> Self {
        Self {
            broadcaster,
            status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
        }
    }
}

/// Body of `POST /sync`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAccepted {
    pub status: String,
    /// Projects that will run a pass, including those that already had one pending.
    pub notified: usize,
    pub coalesced: usize,
}

/// Body of `POST /sync/:project`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSyncAccepted {
    pub status: String,
    pub project: ProjectName,
    pub coalesced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub projects: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub started_at: DateTime<Utc>,
    pub projects: Vec<ProjectStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/sync", post(sync_all))
        .route("/sync/:project", post(sync_project))
        .route("/health", get(health))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn sync_all(State(state): State<AppState>) -> Json<SyncAccepted> {
    let report = state.broadcaster.notify_all();
    tracing::info!(
        delivered = report.delivered.len(),
        coalesced = report.coalesced.len(),
        closed = report.closed.len(),
        "manual sync requested",
    );
    Json(SyncAccepted {
        status: "accepted".to_string(),
        notified: report.notified(),
        coalesced: report.coalesced.len(),
    })
}

async fn sync_project(State(state): State<AppState>, Path(project): Path<String>) -> Response {
    let name = ProjectName(project);
    match state.broadcaster.notify(&name) {
        Some(Delivery::Closed) => {
            tracing::warn!(project = %name, "sync requested for a stopped project");
            error(
                StatusCode::CONFLICT,
                format!("project '{name}' is not running"),
            )
        }
        Some(delivery) => {
            tracing::info!(project = %name, ?delivery, "manual sync requested");
            Json(ProjectSyncAccepted {
                status: "accepted".to_string(),
                project: name,
                coalesced: delivery == Delivery::Coalesced,
            })
            .into_response()
        }
        None => error(StatusCode::NOT_FOUND, format!("unknown project '{name}'")),
    }
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: state.version.clone(),
        started_at: state.started_at,
        projects: state.broadcaster.len(),
    })
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: state.version.clone(),
        started_at: state.started_at,
        projects: state.status.snapshot().await,
    })
}

fn error(code: StatusCode, message: String) -> Response {
    (code, Json(ErrorBody { error: message })).into_response()
}
