use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    reward::Reward,
    session::{SessionInfo, SessionSnapshot},
    task::Task,
};
use crate::sync::{
    backend::SessionBackend,
    error::SyncError,
    event::{Change, ChangeEvent},
    reconciler::{Applied, Skip, Table},
};

/// One client's copy of one session's tasks and rewards.
///
/// A store is created when a session view opens and dropped when it
/// closes; reopening always starts from a fresh [`SessionStore::hydrate`].
/// Every state change goes through an event, whether it came from the
/// feed or from a local optimistic action.
#[derive(Debug, Clone)]
pub struct SessionStore {
    session: SessionInfo,
    tasks: Table<Task>,
    rewards: Table<Reward>,
}

impl SessionStore {
    /// Fetches the full current state of a session once.
    pub async fn hydrate<B>(backend: &B, session_id: Uuid, viewer: Uuid) -> Result<Self, SyncError>
    where
        B: SessionBackend + ?Sized,
    {
        let snapshot = backend.fetch_session(session_id, viewer).await?;
        if !snapshot.session.has_participant(viewer) {
            return Err(SyncError::Unauthorized);
        }
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let mut store = Self {
            session: snapshot.session,
            tasks: Table::default(),
            rewards: Table::default(),
        };
        store.replace_rows(snapshot.tasks, snapshot.rewards);
        store
    }

    /// Swaps in a fresh server snapshot after a feed reconnect.
    pub fn rehydrate(&mut self, snapshot: SessionSnapshot) -> Result<(), SyncError> {
        if snapshot.session.id != self.session.id {
            return Err(SyncError::NotFound);
        }
        self.session = snapshot.session;
        self.replace_rows(snapshot.tasks, snapshot.rewards);
        Ok(())
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    pub fn info(&self) -> &SessionInfo {
        &self.session
    }

    pub fn apply(&mut self, event: ChangeEvent) -> Applied {
        match event {
            ChangeEvent::Task(change) => self.apply_task_event(change),
            ChangeEvent::Reward(change) => self.apply_reward_event(change),
        }
    }

    pub fn apply_task_event(&mut self, change: Change<Task>) -> Applied {
        if let Change::Insert(task) | Change::Update(task) = &change {
            if let Err(reason) = self.check_task(task) {
                warn!(task_id = %task.id, session_id = %self.session.id, reason, "dropping task event");
                return Applied::Ignored(Skip::Violation);
            }
        }

        let applied = self.tasks.apply(change);
        if !applied.changed() {
            debug!(session_id = %self.session.id, ?applied, "task event ignored");
        }
        applied
    }

    pub fn apply_reward_event(&mut self, change: Change<Reward>) -> Applied {
        if let Change::Insert(reward) | Change::Update(reward) = &change {
            if let Err(reason) = self.check_reward(reward) {
                warn!(reward_id = %reward.id, session_id = %self.session.id, reason, "dropping reward event");
                return Applied::Ignored(Skip::Violation);
            }
        }

        let applied = self.rewards.apply(change);
        if !applied.changed() {
            debug!(session_id = %self.session.id, ?applied, "reward event ignored");
        }
        applied
    }

    /// Applies a local optimistic task change ahead of the server.
    pub fn stage_task(&mut self, change: Change<Task>) -> Result<(), SyncError> {
        if let Change::Insert(task) | Change::Update(task) = &change {
            self.check_task(task)
                .map_err(|_| SyncError::Unauthorized)?;
        }
        self.tasks.stage(change);
        Ok(())
    }

    pub fn stage_reward(&mut self, change: Change<Reward>) -> Result<(), SyncError> {
        if let Change::Insert(reward) | Change::Update(reward) = &change {
            self.check_reward(reward)
                .map_err(|reason| SyncError::ValidationFailed(reason.to_string()))?;
        }
        self.rewards.stage(change);
        Ok(())
    }

    pub fn confirm_task(&mut self, task_id: Uuid, outcome: Option<Task>) -> Applied {
        if let Some(task) = &outcome {
            if self.check_task(task).is_err() {
                self.tasks.rollback(task_id);
                return Applied::Ignored(Skip::Violation);
            }
        }
        self.tasks.confirm(task_id, outcome)
    }

    pub fn confirm_reward(&mut self, reward_id: Uuid, outcome: Option<Reward>) -> Applied {
        if let Some(reward) = &outcome {
            if self.check_reward(reward).is_err() {
                self.rewards.rollback(reward_id);
                return Applied::Ignored(Skip::Violation);
            }
        }
        self.rewards.confirm(reward_id, outcome)
    }

    pub fn rollback_task(&mut self, task_id: Uuid) -> bool {
        self.tasks.rollback(task_id)
    }

    pub fn rollback_reward(&mut self, reward_id: Uuid) -> bool {
        self.rewards.rollback(reward_id)
    }

    /// The task as the local user currently sees it.
    pub fn task(&self, task_id: Uuid) -> Option<Task> {
        self.tasks.get(task_id)
    }

    /// Whether the server has confirmed `task_id` and not deleted it since.
    pub fn has_confirmed_task(&self, task_id: Uuid) -> bool {
        self.tasks.confirmed(task_id).is_some()
    }

    pub fn reward(&self, reward_id: Uuid) -> Option<Reward> {
        self.rewards.get(reward_id)
    }

    /// The reward `giver` has defined in this session, if any.
    pub fn reward_given_by(&self, giver: Uuid) -> Option<Reward> {
        self.rewards
            .view()
            .into_iter()
            .find(|reward| reward.giver_user_id == giver)
    }

    /// The current state, before any visibility filtering.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session: self.session.clone(),
            tasks: self.tasks.view(),
            rewards: self.rewards.view(),
        }
    }

    fn replace_rows(&mut self, tasks: Vec<Task>, rewards: Vec<Reward>) {
        let (tasks, dropped_tasks): (Vec<_>, Vec<_>) =
            tasks.into_iter().partition(|task| self.check_task(task).is_ok());
        let (rewards, dropped_rewards): (Vec<_>, Vec<_>) =
            rewards.into_iter().partition(|reward| self.check_reward(reward).is_ok());

        if !dropped_tasks.is_empty() || !dropped_rewards.is_empty() {
            warn!(
                session_id = %self.session.id,
                dropped_tasks = dropped_tasks.len(),
                dropped_rewards = dropped_rewards.len(),
                "snapshot contained rows breaking session invariants"
            );
        }

        self.tasks.reset(tasks);
        self.rewards.reset(rewards);
    }

    fn check_task(&self, task: &Task) -> Result<(), &'static str> {
        if task.session_id != self.session.id {
            return Err("task belongs to another session");
        }
        if !self.session.has_participant(task.owner_user_id) {
            return Err("task owner is not a participant");
        }
        Ok(())
    }

    fn check_reward(&self, reward: &Reward) -> Result<(), &'static str> {
        if reward.session_id != self.session.id {
            return Err("reward belongs to another session");
        }
        if reward.giver_user_id == reward.receiver_user_id {
            return Err("reward giver and receiver are the same participant");
        }
        if !self.session.has_participant(reward.giver_user_id)
            || !self.session.has_participant(reward.receiver_user_id)
        {
            return Err("reward giver or receiver is not a participant");
        }
        Ok(())
    }
}
