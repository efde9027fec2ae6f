use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    handlers::response::json_response,
    models::{auth::AuthSession, reward::NewReward},
    services::{rewards as reward_service, sessions as session_service},
    state::AppState,
    sync::visibility::project_with,
};

#[derive(Deserialize)]
pub struct CreateRewardRequest {
    #[serde(default)]
    pub id: Option<Uuid>,
    /// Defaults to the other participant of the session.
    #[serde(default)]
    pub receiver_user_id: Option<Uuid>,
    pub description: String,
}

#[derive(Deserialize)]
pub struct UpdateRewardRequest {
    pub description: String,
}

/// Creates a reward from the caller.
///
/// The response is the caller's own view of the session's rewards, so the
/// giver gets confirmation without the description echoed back.
#[axum::debug_handler]
pub async fn create_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(session_id): Path<Uuid>,
    Json(req): Json<CreateRewardRequest>,
) -> Result<Response> {
    let receiver_user_id = match req.receiver_user_id {
        Some(id) => id,
        None => session_service::require_participant(&state.db, session_id, auth.user_id)
            .await?
            .participant_ids()
            .into_iter()
            .find(|id| *id != auth.user_id)
            .ok_or_else(|| {
                AppError::Validation("Nobody in this session to receive a reward".to_string())
            })?,
    };

    let reward = reward_service::create_reward(
        &state,
        session_id,
        auth.user_id,
        NewReward {
            id: req.id.unwrap_or_else(Uuid::new_v4),
            giver_user_id: auth.user_id,
            receiver_user_id,
            description: req.description,
        },
    )
    .await?;

    let view = own_reward_view(&state, session_id, auth.user_id, reward.id).await?;
    json_response(StatusCode::CREATED, &view)
}

#[axum::debug_handler]
pub async fn update_reward(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(reward_id): Path<Uuid>,
    Json(req): Json<UpdateRewardRequest>,
) -> Result<Response> {
    let reward = reward_service::update_reward(&state, reward_id, auth.user_id, req.description).await?;

    let view = own_reward_view(&state, reward.session_id, auth.user_id, reward.id).await?;
    json_response(StatusCode::OK, &view)
}

/// The reward as `viewer` is allowed to see it.
async fn own_reward_view(
    state: &AppState,
    session_id: Uuid,
    viewer: Uuid,
    reward_id: Uuid,
) -> Result<crate::sync::visibility::RewardView> {
    let snapshot = session_service::load_snapshot(&state.db, session_id, viewer).await?;
    project_with(&snapshot, viewer, state.config.reward_reveal)
        .rewards
        .into_iter()
        .find(|r| r.id == reward_id)
        .ok_or(AppError::NotFound)
}
