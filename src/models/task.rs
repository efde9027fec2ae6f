use chrono::{DateTime, Utc};
use postgres_types::{FromSql, ToSql};
use serde::{Deserialize, Serialize};
use tokio_postgres::Row;
use uuid::Uuid;

/// How hard a task is, as chosen by its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSql, FromSql)]
#[postgres(name = "task_difficulty")]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[postgres(name = "easy")]
    Easy,
    #[default]
    #[postgres(name = "medium")]
    Medium,
    #[postgres(name = "hard")]
    Hard,
}

impl Difficulty {
    /// Returns the next difficulty in the `easy → medium → hard → easy` cycle.
    pub fn next(self) -> Self {
        match self {
            Difficulty::Easy => Difficulty::Medium,
            Difficulty::Medium => Difficulty::Hard,
            Difficulty::Hard => Difficulty::Easy,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

/// A task inside a work session, in the canonical internal shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// The unique identifier for the task.
    pub id: Uuid,
    /// The session this task belongs to.
    pub session_id: Uuid,
    /// The participant who owns the task. Only they may mutate it.
    pub owner_user_id: Uuid,
    /// Free text title.
    pub title: String,
    /// Whether the owner marked the task as completed.
    pub done: bool,
    pub difficulty: Difficulty,
    /// Monotonic per-row revision, bumped by the backend on every update.
    pub revision: i64,
}

/// A task row as the backend names it (`owner_user_id`, `is_done`, ...).
///
/// This is the only shape that crosses the database and change feed
/// boundary; it is converted into [`Task`] before anything else sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub owner_user_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub is_done: Option<bool>,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    #[serde(default)]
    pub revision: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&Row> for TaskRow {
    fn from(row: &Row) -> Self {
        Self {
            id: row.get("id"),
            session_id: row.get("session_id"),
            owner_user_id: row.get("owner_user_id"),
            title: row.get("title"),
            is_done: Some(row.get("is_done")),
            difficulty: Some(row.get("difficulty")),
            revision: Some(row.get("revision")),
            created_at: Some(row.get("created_at")),
            updated_at: Some(row.get("updated_at")),
        }
    }
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            owner_user_id: row.owner_user_id,
            title: row.title,
            done: row.is_done.unwrap_or(false),
            difficulty: row.difficulty.unwrap_or_default(),
            revision: row.revision.unwrap_or(1),
        }
    }
}

impl From<&Task> for TaskRow {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id,
            session_id: task.session_id,
            owner_user_id: task.owner_user_id,
            title: task.title.clone(),
            is_done: Some(task.done),
            difficulty: Some(task.difficulty),
            revision: Some(task.revision),
            created_at: None,
            updated_at: None,
        }
    }
}

/// Fields of a task create call (`owner_user_id`, `title`, `is_done`, `difficulty`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    /// Client-chosen id so an optimistic insert can be matched with its echo.
    pub id: Uuid,
    pub owner_user_id: Uuid,
    pub title: String,
    pub is_done: bool,
    pub difficulty: Difficulty,
}

/// A partial task update. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub is_done: Option<bool>,
    pub difficulty: Option<Difficulty>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.is_done.is_none() && self.difficulty.is_none()
    }

    /// Applies the patch to a local copy, as an optimistic guess of the server result.
    pub fn apply_to(&self, task: &Task) -> Task {
        Task {
            title: self.title.clone().unwrap_or_else(|| task.title.clone()),
            done: self.is_done.unwrap_or(task.done),
            difficulty: self.difficulty.unwrap_or(task.difficulty),
            ..task.clone()
        }
    }
}
