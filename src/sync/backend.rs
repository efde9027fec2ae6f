use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    reward::{NewReward, Reward},
    session::SessionSnapshot,
    task::{NewTask, Task, TaskPatch},
};
use crate::sync::error::SyncError;

/// The hydration source and mutation target of a session room.
///
/// Implemented over the database in the server and by in-memory fakes in
/// tests. `viewer` is the acting participant; implementations enforce
/// participation and ownership and answer with the authoritative row.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    /// Session metadata, participants, tasks and rewards in one read.
    async fn fetch_session(&self, session_id: Uuid, viewer: Uuid) -> Result<SessionSnapshot, SyncError>;

    async fn create_task(&self, session_id: Uuid, viewer: Uuid, task: NewTask) -> Result<Task, SyncError>;

    async fn update_task(&self, task_id: Uuid, viewer: Uuid, patch: TaskPatch) -> Result<Task, SyncError>;

    async fn delete_task(&self, task_id: Uuid, viewer: Uuid) -> Result<(), SyncError>;

    async fn create_reward(&self, session_id: Uuid, viewer: Uuid, reward: NewReward) -> Result<Reward, SyncError>;

    async fn update_reward(&self, reward_id: Uuid, viewer: Uuid, description: String) -> Result<Reward, SyncError>;
}
