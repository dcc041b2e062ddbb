use axum::{
    Json,
    extract::{
        Path, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;
use taskplatform_storage::{
    Command, ErrorCategory, HealthReport, NewTask, StorageError, Task, TaskId, TaskPatch,
    TaskStats,
};
use time::OffsetDateTime;

use crate::server::AppState;

/// Errors returned by the task API, rendered as `{"error": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            ApiError::Storage(StorageError::NotFound { entity, .. }) => {
                (StatusCode::NOT_FOUND, format!("{entity} not found"))
            }
            ApiError::Storage(err @ StorageError::Validation { .. }) => {
                (StatusCode::BAD_REQUEST, err.to_string())
            }
            ApiError::Storage(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        if let ApiError::Storage(err) = &self {
            match err.category() {
                ErrorCategory::Infrastructure | ErrorCategory::Internal => {
                    tracing::error!(error = %err, category = %err.category(), "request failed");
                }
                ErrorCategory::NotFound | ErrorCategory::Validation => {
                    tracing::debug!(error = %err, "request rejected");
                }
            }
        }
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(_: PathRejection) -> Self {
        ApiError::BadRequest("Invalid task id".to_string())
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "taskplatform",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

// ---- Tasks ----

pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<Json<Vec<Task>>> {
    Ok(Json(state.tasks.list().await?))
}

pub async fn get_task(
    State(state): State<AppState>,
    id: Result<Path<TaskId>, PathRejection>,
) -> ApiResult<Json<Task>> {
    let Path(id) = id?;
    Ok(Json(state.tasks.get(id).await?))
}

pub async fn create_task(
    State(state): State<AppState>,
    body: Result<Json<NewTask>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let Json(draft) = body?;
    let task = state.tasks.mutate(Command::Create(draft)).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task(
    State(state): State<AppState>,
    id: Result<Path<TaskId>, PathRejection>,
    body: Result<Json<TaskPatch>, JsonRejection>,
) -> ApiResult<Json<Task>> {
    let Path(id) = id?;
    let Json(patch) = body?;
    Ok(Json(state.tasks.mutate(Command::Update(id, patch)).await?))
}

pub async fn delete_task(
    State(state): State<AppState>,
    id: Result<Path<TaskId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    state.tasks.mutate(Command::Delete(id)).await?;
    Ok(Json(json!({ "message": "Task deleted successfully" })))
}

pub async fn stats(State(state): State<AppState>) -> ApiResult<Json<TaskStats>> {
    let tasks = state.tasks.list().await?;
    Ok(Json(TaskStats::from_tasks(&tasks)))
}

// ---- Operations ----

#[derive(Serialize)]
pub struct HealthResponse {
    #[serde(flatten)]
    report: HealthReport,
    #[serde(with = "time::serde::rfc3339")]
    timestamp: OffsetDateTime,
    uptime_seconds: f64,
}

pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let report = state.tasks.health().await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = HealthResponse {
        report,
        timestamp: OffsetDateTime::now_utc(),
        uptime_seconds: state.started_at.elapsed().as_secs_f64(),
    };
    (status, Json(body))
}

pub async fn metrics() -> impl IntoResponse {
    match crate::metrics::render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => ApiError::Storage(StorageError::internal("metrics recorder not installed"))
            .into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (StorageError::not_found("Task", 7), StatusCode::NOT_FOUND, "Task not found"),
            (
                StorageError::validation("Title is required"),
                StatusCode::BAD_REQUEST,
                "Title is required",
            ),
            (
                StorageError::unavailable("pool timed out"),
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            ),
            (
                StorageError::internal("corrupt row"),
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
            ),
        ];

        for (err, status, message) in cases {
            let (got_status, got_message) = ApiError::from(err).status_and_message();
            assert_eq!(got_status, status);
            assert_eq!(got_message, message);
        }
    }

    #[test]
    fn test_bad_request_keeps_message() {
        let (status, message) = ApiError::BadRequest("Invalid task id".into()).status_and_message();
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(message, "Invalid task id");
    }
}
