use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::Result,
    handlers::response::json_response,
    models::{
        auth::AuthSession,
        task::{Difficulty, NewTask, TaskPatch},
    },
    services::tasks as task_service,
    state::AppState,
};

/// The request payload for adding a task. The caller always owns it.
#[derive(Deserialize)]
pub struct CreateTaskRequest {
    /// Client-chosen id, so an optimistic copy can be matched with the echo.
    #[serde(default)]
    pub id: Option<Uuid>,
    pub title: String,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub is_done: bool,
}

#[axum::debug_handler]
pub async fn create_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<CreateTaskRequest>,
) -> Result<Response> {
    let task = task_service::create_task(
        &state,
        session_id,
        auth.user_id,
        NewTask {
            id: req.id.unwrap_or_else(Uuid::new_v4),
            owner_user_id: auth.user_id,
            title: req.title,
            is_done: req.is_done,
            difficulty: req.difficulty,
        },
    )
    .await?;

    json_response(StatusCode::CREATED, &task)
}

#[axum::debug_handler]
pub async fn update_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(task_id): Path<Uuid>,
    Json(patch): Json<TaskPatch>,
) -> Result<Response> {
    let task = task_service::update_task(&state, task_id, auth.user_id, patch).await?;
    json_response(StatusCode::OK, &task)
}

#[axum::debug_handler]
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(task_id): Path<Uuid>,
) -> Result<Response> {
    task_service::delete_task(&state, task_id, auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
