//! What a given participant is allowed to see of a session.
//!
//! A reward's description is never handed to its giver. The receiver sees
//! it according to the configured [`RevealPolicy`]; everyone else only
//! learns that the reward exists.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    reward::Reward,
    session::{SessionInfo, SessionSnapshot},
    task::Task,
};

/// When the receiver may read a reward's description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealPolicy {
    /// Always visible to the receiver.
    #[default]
    Always,
    /// Sealed until the receiver has at least one task and all of them are done.
    OnCompletion,
}

impl FromStr for RevealPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(RevealPolicy::Always),
            "on_completion" => Ok(RevealPolicy::OnCompletion),
            other => Err(format!("unknown reward reveal policy `{}`", other)),
        }
    }
}

/// A reward as one viewer may see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RewardView {
    pub id: Uuid,
    pub giver_user_id: Uuid,
    pub receiver_user_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// True when the description is withheld from this viewer.
    pub sealed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantProgress {
    pub user_id: Uuid,
    pub completed: usize,
    pub total: usize,
}

impl ParticipantProgress {
    pub fn all_done(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

/// The externally visible projection of a session for one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub session: SessionInfo,
    pub viewer_user_id: Uuid,
    pub tasks: Vec<Task>,
    pub rewards: Vec<RewardView>,
    pub progress: Vec<ParticipantProgress>,
}

/// Projects `session` for `viewer` with the default reveal policy.
pub fn project(session: &SessionSnapshot, viewer: Uuid) -> Projection {
    project_with(session, viewer, RevealPolicy::default())
}

/// Projects `session` for `viewer`. Pure; call it again after every change.
pub fn project_with(session: &SessionSnapshot, viewer: Uuid, policy: RevealPolicy) -> Projection {
    let progress: Vec<ParticipantProgress> = session
        .session
        .participants
        .iter()
        .map(|participant| progress_of(&session.tasks, participant.id))
        .collect();

    let rewards = session
        .rewards
        .iter()
        .map(|reward| view_reward(reward, viewer, policy, &progress))
        .collect();

    Projection {
        session: session.session.clone(),
        viewer_user_id: viewer,
        tasks: session.tasks.clone(),
        rewards,
        progress,
    }
}

fn progress_of(tasks: &[Task], user_id: Uuid) -> ParticipantProgress {
    let owned = tasks.iter().filter(|task| task.owner_user_id == user_id);
    let (completed, total) = owned.fold((0, 0), |(done, total), task| {
        (done + usize::from(task.done), total + 1)
    });
    ParticipantProgress { user_id, completed, total }
}

fn view_reward(
    reward: &Reward,
    viewer: Uuid,
    policy: RevealPolicy,
    progress: &[ParticipantProgress],
) -> RewardView {
    let revealed = reward.giver_user_id != viewer
        && reward.receiver_user_id == viewer
        && match policy {
            RevealPolicy::Always => true,
            RevealPolicy::OnCompletion => progress
                .iter()
                .find(|p| p.user_id == viewer)
                .is_some_and(ParticipantProgress::all_done),
        };

    RewardView {
        id: reward.id,
        giver_user_id: reward.giver_user_id,
        receiver_user_id: reward.receiver_user_id,
        description: revealed.then(|| reward.description.clone()),
        sealed: !revealed,
    }
}
