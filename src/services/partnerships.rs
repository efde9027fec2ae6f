use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::partnership::Partnership,
    repositories::partnership as partnership_repo,
    services::realtime,
    state::AppState,
    sync::event::{ChangeKind, PartnershipChange},
};

pub async fn list_active(state: &AppState, user_id: Uuid) -> Result<Vec<Partnership>> {
    partnership_repo::list_active_for_user(&state.db, user_id).await
}

/// Pairs two users directly. Invites and matching happen elsewhere.
///
/// # Returns
///
/// The new partnership, or a validation error for a self-pairing or a
/// pair that is already active.
pub async fn create(state: &AppState, user_id: Uuid, partner_user_id: Uuid) -> Result<Partnership> {
    if user_id == partner_user_id {
        return Err(AppError::Validation(
            "You cannot partner with yourself".to_string(),
        ));
    }

    if partnership_repo::find_active_between(&state.db, user_id, partner_user_id)
        .await?
        .is_some()
    {
        return Err(AppError::Validation(
            "An active partnership with this user already exists".to_string(),
        ));
    }

    let partnership = partnership_repo::insert(&state.db, Uuid::new_v4(), user_id, partner_user_id).await?;
    tracing::info!(partnership_id = %partnership.id, "✅ Partnership created");

    realtime::publish_partnership(state, PartnershipChange::Partnerships {
        event_type: ChangeKind::Insert,
        new: partnership.clone(),
    })
    .await;
    Ok(partnership)
}

/// Soft-deletes a partnership. Past sessions stay readable.
pub async fn deactivate(state: &AppState, user_id: Uuid, partnership_id: Uuid) -> Result<Partnership> {
    let partnership = require_member(state, user_id, partnership_id).await?;
    if !partnership.is_active() {
        return Ok(partnership);
    }

    let partnership = partnership_repo::deactivate(&state.db, partnership_id)
        .await?
        .ok_or(AppError::NotFound)?;
    tracing::info!(%partnership_id, "🔕 Partnership deactivated");

    realtime::publish_partnership(state, PartnershipChange::Partnerships {
        event_type: ChangeKind::Update,
        new: partnership.clone(),
    })
    .await;
    Ok(partnership)
}

/// Loads a partnership and checks that `user_id` belongs to it.
pub async fn require_member(state: &AppState, user_id: Uuid, partnership_id: Uuid) -> Result<Partnership> {
    let partnership = partnership_repo::find_by_id(&state.db, partnership_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if !partnership.includes(user_id) {
        tracing::warn!(%partnership_id, %user_id, "❌ Not a member of this partnership");
        return Err(AppError::Unauthorized);
    }
    Ok(partnership)
}
