use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::{
    error::Result,
    models::task::{NewTask, TaskPatch, TaskRow},
};

/// Lists a session's tasks in creation order.
pub async fn list_for_session(pool: &Pool, session_id: Uuid) -> Result<Vec<TaskRow>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            SELECT *
            FROM tasks
            WHERE session_id = $1
            ORDER BY created_at, id
            "#,
        )
        .await?;
    let rows = client.query(&stmt, &[&session_id]).await?;
    Ok(rows.iter().map(TaskRow::from).collect())
}

pub async fn find_by_id(pool: &Pool, task_id: Uuid) -> Result<Option<TaskRow>> {
    let client = pool.get().await?;
    let stmt = client.prepare_cached("SELECT * FROM tasks WHERE id = $1").await?;
    let row = client.query_opt(&stmt, &[&task_id]).await?;
    Ok(row.as_ref().map(TaskRow::from))
}

/// Inserts a task. Returns `None` when the id is already taken.
pub async fn insert(pool: &Pool, session_id: Uuid, task: &NewTask) -> Result<Option<TaskRow>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            INSERT INTO tasks (id, session_id, owner_user_id, title, is_done, difficulty)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO NOTHING
            RETURNING *
            "#,
        )
        .await?;
    let row = client
        .query_opt(
            &stmt,
            &[
                &task.id,
                &session_id,
                &task.owner_user_id,
                &task.title,
                &task.is_done,
                &task.difficulty,
            ],
        )
        .await?;
    Ok(row.as_ref().map(TaskRow::from))
}

/// Applies a partial update and bumps the revision by one.
pub async fn update(pool: &Pool, task_id: Uuid, patch: &TaskPatch) -> Result<Option<TaskRow>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached(
            r#"
            UPDATE tasks
            SET
                title = COALESCE($2, title),
                is_done = COALESCE($3, is_done),
                difficulty = COALESCE($4, difficulty),
                revision = revision + 1,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .await?;
    let row = client
        .query_opt(&stmt, &[&task_id, &patch.title, &patch.is_done, &patch.difficulty])
        .await?;
    Ok(row.as_ref().map(TaskRow::from))
}

/// Deletes a task, returning the removed row.
pub async fn delete(pool: &Pool, task_id: Uuid) -> Result<Option<TaskRow>> {
    let client = pool.get().await?;
    let stmt = client
        .prepare_cached("DELETE FROM tasks WHERE id = $1 RETURNING *")
        .await?;
    let row = client.query_opt(&stmt, &[&task_id]).await?;
    Ok(row.as_ref().map(TaskRow::from))
}
