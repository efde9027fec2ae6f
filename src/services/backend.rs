use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    models::{
        reward::{NewReward, Reward},
        session::SessionSnapshot,
        task::{NewTask, Task, TaskPatch},
    },
    services::{rewards, sessions, tasks},
    state::AppState,
    sync::{SessionBackend, SyncError},
};

/// [`SessionBackend`] over this service's own database and change feed.
#[derive(Clone)]
pub struct PgBackend {
    state: AppState,
}

impl PgBackend {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl SessionBackend for PgBackend {
    async fn fetch_session(&self, session_id: Uuid, viewer: Uuid) -> Result<SessionSnapshot, SyncError> {
        Ok(sessions::load_snapshot(&self.state.db, session_id, viewer).await?)
    }

    async fn create_task(&self, session_id: Uuid, viewer: Uuid, task: NewTask) -> Result<Task, SyncError> {
        Ok(tasks::create_task(&self.state, session_id, viewer, task).await?)
    }

    async fn update_task(&self, task_id: Uuid, viewer: Uuid, patch: TaskPatch) -> Result<Task, SyncError> {
        Ok(tasks::update_task(&self.state, task_id, viewer, patch).await?)
    }

    async fn delete_task(&self, task_id: Uuid, viewer: Uuid) -> Result<(), SyncError> {
        Ok(tasks::delete_task(&self.state, task_id, viewer).await?)
    }

    async fn create_reward(&self, session_id: Uuid, viewer: Uuid, reward: NewReward) -> Result<Reward, SyncError> {
        Ok(rewards::create_reward(&self.state, session_id, viewer, reward).await?)
    }

    async fn update_reward(&self, reward_id: Uuid, viewer: Uuid, description: String) -> Result<Reward, SyncError> {
        Ok(rewards::update_reward(&self.state, reward_id, viewer, description).await?)
    }
}
