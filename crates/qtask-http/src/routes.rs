//! Handlers for the three routes spec §4.6/§6 names: submit, query,
//! health. Each extracts the request's [`CorrelationId`] and echoes it
//! into every response body.

use axum::extract::{Path, State};
use axum::response::{IntoResponse, Json};
use axum::Extension;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use qtask_core::task::{StatusHistoryEntry, Task};

use crate::correlation::CorrelationId;
use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub circuit: String,
    #[serde(default)]
    pub shots: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct HistoryEntryView {
    pub status: String,
    pub transitioned_at: chrono::DateTime<Utc>,
    pub notes: Option<String>,
}

impl From<&StatusHistoryEntry> for HistoryEntryView {
    fn from(e: &StatusHistoryEntry) -> Self {
        Self {
            status: e.status.as_str().to_string(),
            transitioned_at: e.transitioned_at,
            notes: e.notes.clone(),
        }
    }
}

/// `POST /tasks` (spec §6).
pub async fn submit_task(
    State(state): State<AppState>,
    Extension(correlation_id): Extension<CorrelationId>,
    Json(body): Json<SubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let correlation_id = correlation_id.as_str().to_string();

    let task = state
        .coordinator
        .submit(&body.circuit, body.shots, &correlation_id)
        .await
        .map_err(|err| ApiError::from_coordinator_error(err, correlation_id.clone()))?;

    Ok(Json(json!({
        "task_id": task.task_id,
        "message": "Task submitted successfully",
        "submitted_at": task.submitted_at,
        "correlation_id": correlation_id,
    })))
}

/// `GET /tasks/{task_id}` (spec §6).
pub async fn get_task(
    State(state): State<AppState>,
    Extension(correlation_id): Extension<CorrelationId>,
    Path(task_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let correlation_id = correlation_id.as_str().to_string();

    let task_id: Uuid = task_id
        .parse()
        .map_err(|_| ApiError::bad_request("task_id must be a valid UUID", correlation_id.clone()))?;

    let (task, history) = state
        .store
        .get_task_with_history(task_id)
        .await
        .map_err(|err| ApiError::from_store_error(err, correlation_id.clone()))?
        .ok_or_else(|| ApiError::not_found(correlation_id.clone()))?;

    Ok(Json(task_response(&task, &history, &correlation_id)))
}

fn task_response(task: &Task, history: &[StatusHistoryEntry], correlation_id: &str) -> serde_json::Value {
    let mut body = json!({
        "task_id": task.task_id,
        "status": task.current_status.as_str(),
        "submitted_at": task.submitted_at,
        "message": status_message(task),
        "status_history": history.iter().map(HistoryEntryView::from).collect::<Vec<_>>(),
        "correlation_id": correlation_id,
    });
    if let Some(result) = &task.result {
        body["result"] = json!(result);
    }
    if let Some(error_message) = &task.error_message {
        body["error_message"] = json!(error_message);
    }
    body
}

fn status_message(task: &Task) -> &'static str {
    use qtask_core::TaskStatus::*;
    match task.current_status {
        Pending => "Task is queued for processing",
        Processing => "Task is currently being processed",
        Completed => "Task completed successfully",
        Failed => "Task failed",
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: chrono::DateTime<Utc>,
    database_status: &'static str,
    queue_status: &'static str,
}

/// `GET /health` (spec §6): `200` always; body reports component health.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_ok = state.store.ping().await;
    let queue_ok = state.broker.health().await;

    Json(HealthResponse {
        status: if db_ok && queue_ok { "healthy" } else { "unhealthy" },
        timestamp: Utc::now(),
        database_status: if db_ok { "connected" } else { "disconnected" },
        queue_status: if queue_ok { "connected" } else { "disconnected" },
    })
}

/// Fallback for anything not matched by an explicit route.
pub async fn not_found(Extension(correlation_id): Extension<CorrelationId>) -> ApiError {
    ApiError::not_found(correlation_id.as_str().to_string())
}
