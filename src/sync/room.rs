//! One viewer's live session room: hydrate, follow the feed, apply local
//! actions optimistically and project the result.

use std::collections::{HashMap, VecDeque, hash_map::Entry};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    reward::{NewReward, Reward},
    task::{Difficulty, NewTask, Task, TaskPatch},
};
use crate::sync::{
    backend::SessionBackend,
    error::SyncError,
    event::{Change, EntityKind},
    feed::{FeedSignal, FeedStatus, Subscription},
    store::SessionStore,
    visibility::{Projection, RevealPolicy, project_with},
};
use crate::validation;

/// Something the local participant asked for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LocalAction {
    AddTask {
        title: String,
        #[serde(default)]
        difficulty: Difficulty,
    },
    ToggleTask {
        task_id: Uuid,
    },
    SetDifficulty {
        task_id: Uuid,
        difficulty: Difficulty,
    },
    DeleteTask {
        task_id: Uuid,
    },
    /// Creates the viewer's reward for their partner, or rewrites it.
    SaveReward {
        description: String,
    },
}

/// The backend call behind a staged action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationRequest {
    CreateTask(NewTask),
    UpdateTask { task_id: Uuid, patch: TaskPatch },
    DeleteTask { task_id: Uuid },
    CreateReward(NewReward),
    UpdateReward { reward_id: Uuid, description: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationAck {
    Task(Task),
    TaskDeleted(Uuid),
    Reward(Reward),
}

/// An action already applied optimistically, waiting for the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedMutation {
    pub session_id: Uuid,
    pub viewer: Uuid,
    pub entity: EntityKind,
    pub entity_id: Uuid,
    pub request: MutationRequest,
}

impl StagedMutation {
    /// Sends the mutation. Does not touch the room, so it can run on another task.
    pub async fn perform<B>(&self, backend: &B) -> Result<MutationAck, SyncError>
    where
        B: SessionBackend + ?Sized,
    {
        match &self.request {
            MutationRequest::CreateTask(task) => backend
                .create_task(self.session_id, self.viewer, task.clone())
                .await
                .map(MutationAck::Task),
            MutationRequest::UpdateTask { task_id, patch } => backend
                .update_task(*task_id, self.viewer, patch.clone())
                .await
                .map(MutationAck::Task),
            MutationRequest::DeleteTask { task_id } => backend
                .delete_task(*task_id, self.viewer)
                .await
                .map(|()| MutationAck::TaskDeleted(*task_id)),
            MutationRequest::CreateReward(reward) => backend
                .create_reward(self.session_id, self.viewer, reward.clone())
                .await
                .map(MutationAck::Reward),
            MutationRequest::UpdateReward { reward_id, description } => backend
                .update_reward(*reward_id, self.viewer, description.clone())
                .await
                .map(MutationAck::Reward),
        }
    }
}

/// Keeps at most one mutation per entity in flight.
///
/// Mutations of one entity reach the backend in the order they were
/// staged; mutations of different entities run concurrently.
#[derive(Debug, Default)]
pub struct MutationQueue {
    waiting: HashMap<Uuid, VecDeque<StagedMutation>>,
}

impl MutationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hands `staged` back when it may be performed now, or parks it behind
    /// the mutation already in flight for the same entity.
    pub fn admit(&mut self, staged: StagedMutation) -> Option<StagedMutation> {
        match self.waiting.entry(staged.entity_id) {
            Entry::Occupied(mut queue) => {
                queue.get_mut().push_back(staged);
                None
            }
            Entry::Vacant(slot) => {
                slot.insert(VecDeque::new());
                Some(staged)
            }
        }
    }

    /// Marks the in-flight mutation of `entity_id` as resolved and returns
    /// the next one to perform, if any. Call [`SessionRoom::restage`] on it first.
    pub fn finish(&mut self, entity_id: Uuid) -> Option<StagedMutation> {
        let Entry::Occupied(mut queue) = self.waiting.entry(entity_id) else {
            return None;
        };
        match queue.get_mut().pop_front() {
            Some(next) => Some(next),
            None => {
                queue.remove();
                None
            }
        }
    }

    /// Number of entities with a mutation in flight.
    pub fn in_flight(&self) -> usize {
        self.waiting.len()
    }
}

/// What a feed signal did to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Changed,
    Unchanged,
    /// The feed reconnected; call [`SessionRoom::resync`].
    ResyncRequired,
}

/// The projection plus connection state, as pushed to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomView {
    pub feed: FeedStatus,
    #[serde(flatten)]
    pub projection: Projection,
}

pub struct SessionRoom<B: SessionBackend + ?Sized> {
    backend: Arc<B>,
    viewer: Uuid,
    policy: RevealPolicy,
    store: SessionStore,
    feed_status: FeedStatus,
    subscription: Option<Subscription>,
}

impl<B: SessionBackend + ?Sized> SessionRoom<B> {
    /// Hydrates a fresh store for `viewer`. Every open starts from the backend.
    pub async fn open(
        backend: Arc<B>,
        session_id: Uuid,
        viewer: Uuid,
        policy: RevealPolicy,
    ) -> Result<Self, SyncError> {
        let store = SessionStore::hydrate(backend.as_ref(), session_id, viewer).await?;
        info!(%session_id, %viewer, "✅ Session room hydrated");

        Ok(Self {
            backend,
            viewer,
            policy,
            store,
            feed_status: FeedStatus::Connecting,
            subscription: None,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.store.session_id()
    }

    pub fn viewer(&self) -> Uuid {
        self.viewer
    }

    pub fn backend(&self) -> Arc<B> {
        self.backend.clone()
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn feed_status(&self) -> FeedStatus {
        self.feed_status
    }

    /// Ties a feed subscription to the room's lifetime.
    pub fn attach(&mut self, subscription: Subscription) {
        if let Some(previous) = self.subscription.replace(subscription) {
            previous.close();
        }
    }

    /// Closes the attached feed, if any. Safe to call repeatedly.
    pub fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.close();
        }
    }

    /// Re-derived on every call, never cached.
    pub fn projection(&self) -> RoomView {
        RoomView {
            feed: self.feed_status,
            projection: project_with(&self.store.snapshot(), self.viewer, self.policy),
        }
    }

    pub fn handle_signal(&mut self, signal: FeedSignal) -> SignalOutcome {
        match signal {
            FeedSignal::Event(event) => {
                if self.store.apply(event).changed() {
                    SignalOutcome::Changed
                } else {
                    SignalOutcome::Unchanged
                }
            }
            FeedSignal::Status(status) if status == self.feed_status => SignalOutcome::Unchanged,
            FeedSignal::Status(status) => {
                debug!(session_id = %self.session_id(), ?status, "feed status changed");
                self.feed_status = status;
                SignalOutcome::Changed
            }
            FeedSignal::Resync => SignalOutcome::ResyncRequired,
        }
    }

    /// Replaces the store's confirmed rows with a fresh backend read.
    pub async fn resync(&mut self) -> Result<(), SyncError> {
        let snapshot = self
            .backend
            .fetch_session(self.session_id(), self.viewer)
            .await?;
        if !snapshot.session.has_participant(self.viewer) {
            return Err(SyncError::Unauthorized);
        }
        self.store.rehydrate(snapshot)?;
        info!(session_id = %self.session_id(), "🔄 Session room re-hydrated");
        Ok(())
    }

    /// Validates `action` and applies it optimistically.
    ///
    /// Nothing is sent yet: run [`StagedMutation::perform`] and hand the
    /// result to [`SessionRoom::resolve`].
    pub fn stage(&mut self, action: LocalAction) -> Result<StagedMutation, SyncError> {
        match action {
            LocalAction::AddTask { title, difficulty } => {
                validation::task::validate_title(&title)?;
                let new = NewTask {
                    id: Uuid::new_v4(),
                    owner_user_id: self.viewer,
                    title: title.trim().to_string(),
                    is_done: false,
                    difficulty,
                };
                self.store.stage_task(Change::Insert(Task {
                    id: new.id,
                    session_id: self.session_id(),
                    owner_user_id: new.owner_user_id,
                    title: new.title.clone(),
                    done: new.is_done,
                    difficulty: new.difficulty,
                    revision: 0,
                }))?;
                Ok(self.staged(EntityKind::Task, new.id, MutationRequest::CreateTask(new)))
            }
            LocalAction::ToggleTask { task_id } => {
                let done = self.owned_task(task_id)?.done;
                self.stage_task_patch(task_id, TaskPatch {
                    is_done: Some(!done),
                    ..TaskPatch::default()
                })
            }
            LocalAction::SetDifficulty { task_id, difficulty } => {
                self.stage_task_patch(task_id, TaskPatch {
                    difficulty: Some(difficulty),
                    ..TaskPatch::default()
                })
            }
            LocalAction::DeleteTask { task_id } => {
                self.owned_task(task_id)?;
                self.store.stage_task(Change::Delete(task_id))?;
                Ok(self.staged(EntityKind::Task, task_id, MutationRequest::DeleteTask { task_id }))
            }
            LocalAction::SaveReward { description } => {
                validation::reward::validate_description(&description)?;
                let description = description.trim().to_string();

                if let Some(existing) = self.store.reward_given_by(self.viewer) {
                    let reward_id = existing.id;
                    self.store.stage_reward(Change::Update(Reward {
                        description: description.clone(),
                        ..existing
                    }))?;
                    return Ok(self.staged(
                        EntityKind::Reward,
                        reward_id,
                        MutationRequest::UpdateReward { reward_id, description },
                    ));
                }

                let receiver = self.store.info().counterpart_of(self.viewer).ok_or_else(|| {
                    SyncError::ValidationFailed("Nobody in this session to receive a reward".into())
                })?;
                let new = NewReward {
                    id: Uuid::new_v4(),
                    giver_user_id: self.viewer,
                    receiver_user_id: receiver,
                    description,
                };
                self.store.stage_reward(Change::Insert(Reward {
                    id: new.id,
                    session_id: self.session_id(),
                    giver_user_id: new.giver_user_id,
                    receiver_user_id: new.receiver_user_id,
                    description: new.description.clone(),
                    revision: 0,
                }))?;
                Ok(self.staged(EntityKind::Reward, new.id, MutationRequest::CreateReward(new)))
            }
        }
    }

    /// Settles a staged mutation. The backend's answer always wins over the guess.
    pub fn resolve(
        &mut self,
        staged: &StagedMutation,
        outcome: Result<MutationAck, SyncError>,
    ) -> Result<(), SyncError> {
        match outcome {
            Ok(MutationAck::Task(task)) => {
                self.store.confirm_task(task.id, Some(task));
                Ok(())
            }
            Ok(MutationAck::TaskDeleted(task_id)) => {
                self.store.confirm_task(task_id, None);
                Ok(())
            }
            Ok(MutationAck::Reward(reward)) => {
                self.store.confirm_reward(reward.id, Some(reward));
                Ok(())
            }
            // A row the server had confirmed is gone; show it gone here too.
            // An id it never confirmed may still be on its way in, so only
            // the guess is dropped below.
            Err(SyncError::NotFound)
                if staged.entity == EntityKind::Task
                    && self.store.has_confirmed_task(staged.entity_id) =>
            {
                self.store.confirm_task(staged.entity_id, None);
                match staged.request {
                    MutationRequest::DeleteTask { .. } => Ok(()),
                    _ => Err(SyncError::NotFound),
                }
            }
            Err(err) => {
                warn!(
                    session_id = %staged.session_id,
                    entity = ?staged.entity,
                    entity_id = %staged.entity_id,
                    error = %err,
                    "mutation rejected, rolling back"
                );
                match staged.entity {
                    EntityKind::Task => self.store.rollback_task(staged.entity_id),
                    EntityKind::Reward => self.store.rollback_reward(staged.entity_id),
                };
                Err(err)
            }
        }
    }

    /// Re-applies the guess of a mutation that waited in a [`MutationQueue`].
    ///
    /// Settling the mutation ahead of it drops every guess for the entity,
    /// so the waiting one is layered again on the now confirmed row.
    pub fn restage(&mut self, staged: &StagedMutation) -> Result<(), SyncError> {
        match &staged.request {
            MutationRequest::CreateTask(_) | MutationRequest::CreateReward(_) => Ok(()),
            MutationRequest::UpdateTask { task_id, patch } => match self.store.task(*task_id) {
                Some(task) => self.store.stage_task(Change::Update(patch.apply_to(&task))),
                None => Ok(()),
            },
            MutationRequest::DeleteTask { task_id } => {
                self.store.stage_task(Change::Delete(*task_id))
            }
            MutationRequest::UpdateReward { reward_id, description } => {
                match self.store.reward(*reward_id) {
                    Some(reward) => self.store.stage_reward(Change::Update(Reward {
                        description: description.clone(),
                        ..reward
                    })),
                    None => Ok(()),
                }
            }
        }
    }

    /// Stages, performs and resolves `action` in one go.
    pub async fn dispatch(&mut self, action: LocalAction) -> Result<(), SyncError> {
        let staged = self.stage(action)?;
        let outcome = staged.perform(self.backend.as_ref()).await;
        self.resolve(&staged, outcome)
    }

    fn staged(&self, entity: EntityKind, entity_id: Uuid, request: MutationRequest) -> StagedMutation {
        StagedMutation {
            session_id: self.session_id(),
            viewer: self.viewer,
            entity,
            entity_id,
            request,
        }
    }

    fn owned_task(&self, task_id: Uuid) -> Result<Task, SyncError> {
        let task = self.store.task(task_id).ok_or(SyncError::NotFound)?;
        if task.owner_user_id != self.viewer {
            return Err(SyncError::Unauthorized);
        }
        Ok(task)
    }

    fn stage_task_patch(&mut self, task_id: Uuid, patch: TaskPatch) -> Result<StagedMutation, SyncError> {
        let task = self.owned_task(task_id)?;
        self.store.stage_task(Change::Update(patch.apply_to(&task)))?;
        Ok(self.staged(EntityKind::Task, task_id, MutationRequest::UpdateTask { task_id, patch }))
    }
}

impl<B: SessionBackend + ?Sized> Drop for SessionRoom<B> {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{Participant, SessionInfo, SessionKind, SessionMode, SessionSnapshot};
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::sync::Mutex;

    /// Backend that answers every fetch with a fixed snapshot and refuses writes.
    struct ReadOnlyBackend {
        snapshot: Mutex<SessionSnapshot>,
    }

    #[async_trait]
    impl SessionBackend for ReadOnlyBackend {
        async fn fetch_session(&self, session_id: Uuid, _viewer: Uuid) -> Result<SessionSnapshot, SyncError> {
            let snapshot = self.snapshot.lock().unwrap().clone();
            if snapshot.session.id != session_id {
                return Err(SyncError::NotFound);
            }
            Ok(snapshot)
        }

        async fn create_task(&self, _: Uuid, _: Uuid, _: NewTask) -> Result<Task, SyncError> {
            Err(SyncError::Backend("read only".into()))
        }

        async fn update_task(&self, _: Uuid, _: Uuid, _: TaskPatch) -> Result<Task, SyncError> {
            Err(SyncError::NotFound)
        }

        async fn delete_task(&self, _: Uuid, _: Uuid) -> Result<(), SyncError> {
            Err(SyncError::NotFound)
        }

        async fn create_reward(&self, _: Uuid, _: Uuid, _: NewReward) -> Result<Reward, SyncError> {
            Err(SyncError::Backend("read only".into()))
        }

        async fn update_reward(&self, _: Uuid, _: Uuid, _: String) -> Result<Reward, SyncError> {
            Err(SyncError::Backend("read only".into()))
        }
    }

    fn backend(participants: &[Uuid], tasks: Vec<Task>) -> (Arc<ReadOnlyBackend>, Uuid) {
        let now = Utc::now();
        let session_id = tasks.first().map(|t| t.session_id).unwrap_or_else(Uuid::new_v4);
        let snapshot = SessionSnapshot {
            session: SessionInfo {
                id: session_id,
                kind: SessionKind::Couple,
                partnership_id: None,
                title: "Pairing".to_string(),
                start_time: now,
                end_time: now + Duration::hours(2),
                mode: SessionMode::Online,
                location: None,
                listing: None,
                participants: participants.iter().copied().map(Participant::anonymous).collect(),
            },
            tasks,
            rewards: Vec::new(),
        };
        (Arc::new(ReadOnlyBackend { snapshot: Mutex::new(snapshot) }), session_id)
    }

    #[tokio::test]
    async fn outsider_cannot_open_the_room() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (backend, session_id) = backend(&[a, b], Vec::new());

        let result = SessionRoom::open(backend, session_id, Uuid::new_v4(), RevealPolicy::Always).await;
        assert!(matches!(result, Err(SyncError::Unauthorized)));
    }

    #[tokio::test]
    async fn blank_title_is_rejected_before_any_call() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (backend, session_id) = backend(&[a, b], Vec::new());
        let mut room = SessionRoom::open(backend, session_id, a, RevealPolicy::Always).await.unwrap();

        let err = room
            .stage(LocalAction::AddTask { title: "  ".into(), difficulty: Difficulty::Easy })
            .unwrap_err();
        assert!(matches!(err, SyncError::ValidationFailed(_)));
        assert!(room.projection().projection.tasks.is_empty());
    }

    #[tokio::test]
    async fn failed_create_rolls_back_the_guess() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let (backend, session_id) = backend(&[a, b], Vec::new());
        let mut room = SessionRoom::open(backend, session_id, a, RevealPolicy::Always).await.unwrap();

        let staged = room
            .stage(LocalAction::AddTask { title: "Write tests".into(), difficulty: Difficulty::Medium })
            .unwrap();
        assert_eq!(room.projection().projection.tasks.len(), 1);

        let outcome = staged.perform(room.backend().as_ref()).await;
        assert!(room.resolve(&staged, outcome).is_err());
        assert!(room.projection().projection.tasks.is_empty());
    }

    #[tokio::test]
    async fn partner_tasks_cannot_be_toggled() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let session_id = Uuid::new_v4();
        let theirs = Task {
            id: Uuid::new_v4(),
            session_id,
            owner_user_id: b,
            title: "Ship it".into(),
            done: false,
            difficulty: Difficulty::Hard,
            revision: 1,
        };
        let (backend, session_id) = backend(&[a, b], vec![theirs.clone()]);
        let mut room = SessionRoom::open(backend, session_id, a, RevealPolicy::Always).await.unwrap();

        assert_eq!(
            room.stage(LocalAction::ToggleTask { task_id: theirs.id }),
            Err(SyncError::Unauthorized)
        );
        assert_eq!(
            room.stage(LocalAction::ToggleTask { task_id: Uuid::new_v4() }),
            Err(SyncError::NotFound)
        );
    }

    #[tokio::test]
    async fn update_of_vanished_task_removes_it() {
        let a = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let mine = Task {
            id: Uuid::new_v4(),
            session_id,
            owner_user_id: a,
            title: "Refactor".into(),
            done: false,
            difficulty: Difficulty::Easy,
            revision: 1,
        };
        let (backend, session_id) = backend(&[a, Uuid::new_v4()], vec![mine.clone()]);
        let mut room = SessionRoom::open(backend, session_id, a, RevealPolicy::Always).await.unwrap();

        let result = room.dispatch(LocalAction::ToggleTask { task_id: mine.id }).await;
        assert_eq!(result, Err(SyncError::NotFound));
        assert!(room.projection().projection.tasks.is_empty());

        // Deleting something already gone is not an error.
        let (backend, session_id) = self::backend(&[a], vec![mine.clone()]);
        let mut room = SessionRoom::open(backend, session_id, a, RevealPolicy::Always).await.unwrap();
        assert_eq!(room.dispatch(LocalAction::DeleteTask { task_id: mine.id }).await, Ok(()));
    }

    #[tokio::test]
    async fn reward_needs_a_counterpart() {
        let a = Uuid::new_v4();
        let (backend, session_id) = backend(&[a], Vec::new());
        let mut room = SessionRoom::open(backend, session_id, a, RevealPolicy::Always).await.unwrap();

        let err = room
            .stage(LocalAction::SaveReward { description: "Coffee".into() })
            .unwrap_err();
        assert!(matches!(err, SyncError::ValidationFailed(_)));
    }

    fn delete_of(task_id: Uuid) -> StagedMutation {
        StagedMutation {
            session_id: Uuid::nil(),
            viewer: Uuid::nil(),
            entity: EntityKind::Task,
            entity_id: task_id,
            request: MutationRequest::DeleteTask { task_id },
        }
    }

    #[test]
    fn queue_runs_one_mutation_per_entity() {
        let (x, y) = (Uuid::new_v4(), Uuid::new_v4());
        let mut queue = MutationQueue::new();

        assert_eq!(queue.admit(delete_of(x)), Some(delete_of(x)));
        assert_eq!(queue.admit(delete_of(y)), Some(delete_of(y)), "other entities run alongside");
        assert_eq!(queue.admit(delete_of(x)), None);
        assert_eq!(queue.in_flight(), 2);

        assert_eq!(queue.finish(x), Some(delete_of(x)));
        assert_eq!(queue.in_flight(), 2, "the parked one is now in flight");
        assert_eq!(queue.finish(x), None);
        assert_eq!(queue.finish(y), None);
        assert_eq!(queue.in_flight(), 0);
        assert_eq!(queue.finish(x), None);
    }

    #[tokio::test]
    async fn toggle_of_an_unconfirmed_task_only_drops_the_guess() {
        let a = Uuid::new_v4();
        let (backend, session_id) = backend(&[a, Uuid::new_v4()], Vec::new());
        let mut room = SessionRoom::open(backend, session_id, a, RevealPolicy::Always).await.unwrap();

        let add = room
            .stage(LocalAction::AddTask { title: "Write tests".into(), difficulty: Difficulty::Easy })
            .unwrap();
        let toggle = room.stage(LocalAction::ToggleTask { task_id: add.entity_id }).unwrap();

        let outcome = Err(SyncError::NotFound);
        assert_eq!(room.resolve(&toggle, outcome), Err(SyncError::NotFound));
        assert!(!room.store().has_confirmed_task(add.entity_id));

        // The create lands afterwards and is not hidden by the failed toggle.
        let task = Task {
            id: add.entity_id,
            session_id,
            owner_user_id: a,
            title: "Write tests".into(),
            done: false,
            difficulty: Difficulty::Easy,
            revision: 1,
        };
        room.resolve(&add, Ok(MutationAck::Task(task.clone()))).unwrap();
        assert_eq!(room.projection().projection.tasks, vec![task]);
    }

    #[test]
    fn local_actions_parse_from_client_json() {
        let action: LocalAction =
            sonic_rs::from_str(r#"{"action":"add_task","title":"Write tests"}"#).unwrap();
        assert_eq!(
            action,
            LocalAction::AddTask { title: "Write tests".into(), difficulty: Difficulty::Medium }
        );

        let id = Uuid::new_v4();
        let action: LocalAction =
            sonic_rs::from_str(&format!(r#"{{"action":"set_difficulty","task_id":"{id}","difficulty":"hard"}}"#))
                .unwrap();
        assert_eq!(action, LocalAction::SetDifficulty { task_id: id, difficulty: Difficulty::Hard });
    }
}
