use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::reward::{NewReward, Reward},
    repositories::reward as reward_repo,
    services::{realtime, sessions},
    state::AppState,
    sync::event::ChangeKind,
    validation,
};

/// Creates a reward from `user_id` to another participant.
///
/// The model allows more than one reward per giver; the live room keeps
/// to one by updating instead of creating.
pub async fn create_reward(state: &AppState, session_id: Uuid, user_id: Uuid, reward: NewReward) -> Result<Reward> {
    validation::reward::validate_description(&reward.description)?;
    validation::reward::validate_parties(reward.giver_user_id, reward.receiver_user_id)?;
    if reward.giver_user_id != user_id {
        return Err(AppError::Unauthorized);
    }

    let session = sessions::require_participant(&state.db, session_id, user_id).await?;
    if !session.has_participant(reward.receiver_user_id) {
        return Err(AppError::Validation(
            "Reward receiver is not part of this session".to_string(),
        ));
    }

    let reward = NewReward {
        description: reward.description.trim().to_string(),
        ..reward
    };
    let row = reward_repo::insert(&state.db, session_id, &reward)
        .await?
        .ok_or_else(|| AppError::Validation("A reward with this id already exists".to_string()))?;

    tracing::debug!(reward_id = %row.id, %session_id, "🎁 Reward created");
    realtime::publish_reward(state, ChangeKind::Insert, row.clone()).await;
    Ok(Reward::from(row))
}

/// Rewrites the description of a reward the caller gave.
pub async fn update_reward(state: &AppState, reward_id: Uuid, user_id: Uuid, description: String) -> Result<Reward> {
    validation::reward::validate_description(&description)?;

    let existing = reward_repo::find_by_id(&state.db, reward_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if existing.giver_user_id != user_id {
        return Err(AppError::Unauthorized);
    }

    let row = reward_repo::update_description(&state.db, reward_id, description.trim())
        .await?
        .ok_or(AppError::NotFound)?;

    tracing::debug!(%reward_id, revision = ?row.revision, "🎁 Reward updated");
    realtime::publish_reward(state, ChangeKind::Update, row.clone()).await;
    Ok(Reward::from(row))
}
