use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::task::{NewTask, Task, TaskPatch, TaskRow},
    repositories::task as task_repo,
    services::{realtime, sessions},
    state::AppState,
    sync::event::ChangeKind,
    validation,
};

/// Loads a task and checks that `user_id` owns it.
async fn require_owner(state: &AppState, task_id: Uuid, user_id: Uuid) -> Result<TaskRow> {
    let row = task_repo::find_by_id(&state.db, task_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if row.owner_user_id != user_id {
        tracing::warn!(%task_id, %user_id, "❌ Task belongs to another participant");
        return Err(AppError::Unauthorized);
    }

    Ok(row)
}

/// Creates a task owned by `user_id` and publishes the insert.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `session_id` - The session the task belongs to.
/// * `user_id` - The acting participant; must equal `task.owner_user_id`.
/// * `task` - The new task.
///
/// # Returns
///
/// The created task as stored.
pub async fn create_task(state: &AppState, session_id: Uuid, user_id: Uuid, task: NewTask) -> Result<Task> {
    validation::task::validate_title(&task.title)?;
    if task.owner_user_id != user_id {
        return Err(AppError::Unauthorized);
    }
    sessions::require_participant(&state.db, session_id, user_id).await?;

    let task = NewTask {
        title: task.title.trim().to_string(),
        ..task
    };
    let row = task_repo::insert(&state.db, session_id, &task)
        .await?
        .ok_or_else(|| AppError::Validation("A task with this id already exists".to_string()))?;

    tracing::debug!(task_id = %row.id, %session_id, "✅ Task created");
    realtime::publish_task(state, ChangeKind::Insert, row.clone()).await;
    Ok(Task::from(row))
}

/// Applies a partial update to a task the caller owns.
pub async fn update_task(state: &AppState, task_id: Uuid, user_id: Uuid, patch: TaskPatch) -> Result<Task> {
    validation::task::validate_patch(&patch)?;
    require_owner(state, task_id, user_id).await?;

    let patch = TaskPatch {
        title: patch.title.map(|t| t.trim().to_string()),
        ..patch
    };
    let row = task_repo::update(&state.db, task_id, &patch)
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::debug!(%task_id, revision = ?row.revision, "✅ Task updated");
    realtime::publish_task(state, ChangeKind::Update, row.clone()).await;
    Ok(Task::from(row))
}

/// Deletes a task the caller owns.
pub async fn delete_task(state: &AppState, task_id: Uuid, user_id: Uuid) -> Result<()> {
    require_owner(state, task_id, user_id).await?;

    let row = task_repo::delete(&state.db, task_id)
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::debug!(%task_id, "🗑️ Task deleted");
    realtime::publish_task(state, ChangeKind::Delete, row).await;
    Ok(())
}
