//! Handlers for the `/tasks` resource.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use partbridge_core::error::CoreError;
use partbridge_core::job::{CreateTaskRequest, JobSpec};
use partbridge_core::types::TaskId;
use partbridge_engine::registry::TASK_ENTITY;

use crate::error::AppResult;
use crate::state::AppState;

/// Parse a task id from the path. Ids that are not UUIDs cannot name a
/// task, so they are reported as not found rather than malformed.
pub fn parse_task_id(raw: &str) -> Result<TaskId, CoreError> {
    TaskId::parse_str(raw).map_err(|_| CoreError::NotFound {
        entity: TASK_ENTITY,
        id: raw.to_string(),
    })
}

/// POST /api/v1/tasks
///
/// Validate the request and queue a conversion. Returns 202 with the
/// queued task's summary.
pub async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<CreateTaskRequest>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(request) = payload?;
    let spec = JobSpec::try_from(request)?;
    let summary = state.tasks.submit(spec).await;
    Ok((StatusCode::ACCEPTED, Json(summary)))
}

/// GET /api/v1/tasks
///
/// All tasks in submission order.
pub async fn list_tasks(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    Ok(Json(state.tasks.list().await))
}

/// GET /api/v1/tasks/{id}
///
/// Task summary plus its full progress log.
pub async fn get_task(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let id = parse_task_id(&raw_id)?;
    Ok(Json(state.tasks.detail(&id).await?))
}
