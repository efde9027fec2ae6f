use chrono::{DateTime, Utc};
use deadpool_postgres::Pool;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        reward::Reward,
        session::{
            ListingStatus, NewSession, PartnerPrefs, SessionFilter, SessionInfo, SessionKind,
            SessionMode, SessionRow, SessionSnapshot, SoloListing,
        },
        task::Task,
    },
    repositories::{
        partnership as partnership_repo, profile as profile_repo, reward as reward_repo,
        session as session_repo, task as task_repo,
    },
    services::{partnerships, realtime},
    state::AppState,
    sync::event::{ChangeKind, PartnershipChange},
    validation,
};

/// Fields a caller supplies when scheduling a session.
#[derive(Debug, Clone)]
pub struct CreateSession {
    /// Set for a couple session; `None` creates a solo session.
    pub partnership_id: Option<Uuid>,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub mode: SessionMode,
    pub location: Option<String>,
    /// Listing details; ignored for couple sessions.
    pub description: Option<String>,
    pub tech_stack: Vec<String>,
    pub partner_prefs: Option<PartnerPrefs>,
}

/// Loads a session row and checks that `user_id` takes part in it.
///
/// # Returns
///
/// `NotFound` when the session does not exist, `Unauthorized` when the
/// user is not one of its participants.
pub async fn require_participant(pool: &Pool, session_id: Uuid, user_id: Uuid) -> Result<SessionRow> {
    let row = session_repo::find_by_id(pool, session_id)
        .await?
        .ok_or(AppError::NotFound)?;

    if !row.has_participant(user_id) {
        tracing::warn!(%session_id, %user_id, "❌ Not a participant of this session");
        return Err(AppError::Unauthorized);
    }

    Ok(row)
}

async fn with_participants(pool: &Pool, row: SessionRow) -> Result<SessionInfo> {
    let participants = profile_repo::find_participants(pool, &row.participant_ids()).await?;
    Ok(SessionInfo::from_row(row, participants))
}

/// Session metadata, participants, tasks and rewards, unfiltered.
///
/// Callers must pass the result through the visibility filter before it
/// leaves the service.
pub async fn load_snapshot(pool: &Pool, session_id: Uuid, viewer: Uuid) -> Result<SessionSnapshot> {
    let row = require_participant(pool, session_id, viewer).await?;

    let (tasks, rewards) = tokio::try_join!(
        task_repo::list_for_session(pool, session_id),
        reward_repo::list_for_session(pool, session_id),
    )?;

    Ok(SessionSnapshot {
        session: with_participants(pool, row).await?,
        tasks: tasks.into_iter().map(Task::from).collect(),
        rewards: rewards.into_iter().map(Reward::from).collect(),
    })
}

/// Creates a couple or solo session.
///
/// The participant set is fixed here: both members of an active
/// partnership, or the host alone.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `user_id` - The creating user; becomes the host.
/// * `input` - Title, window, mode and optional partnership.
pub async fn create_session(state: &AppState, user_id: Uuid, input: CreateSession) -> Result<SessionInfo> {
    let location = match input.mode {
        SessionMode::Offline => input
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string),
        SessionMode::Online => None,
    };

    validation::session::validate_session(
        &input.title,
        input.start_time,
        input.end_time,
        location.as_deref(),
    )?;

    let (kind, partner_user_id) = match input.partnership_id {
        Some(partnership_id) => {
            let partnership = partnership_repo::find_by_id(&state.db, partnership_id)
                .await?
                .ok_or(AppError::NotFound)?;
            let partner = partnership.partner_of(user_id).ok_or(AppError::Unauthorized)?;
            if !partnership.is_active() {
                return Err(AppError::Validation(
                    "Partnership is no longer active".to_string(),
                ));
            }
            (SessionKind::Couple, Some(partner))
        }
        None => (SessionKind::Solo, None),
    };

    let listing = match kind {
        SessionKind::Solo => {
            let listing = SoloListing {
                description: input.description.as_deref().unwrap_or_default().trim().to_string(),
                tech_stack: input.tech_stack.iter().map(|t| t.trim().to_string()).collect(),
                partner_preferences: input.partner_prefs.unwrap_or_default(),
                status: ListingStatus::Open,
            };
            validation::session::validate_listing(&listing)?;
            Some(listing)
        }
        SessionKind::Couple => None,
    };

    let new_session = NewSession {
        kind,
        partnership_id: input.partnership_id,
        host_user_id: user_id,
        partner_user_id,
        title: input.title.trim().to_string(),
        start_time: input.start_time,
        end_time: input.end_time,
        mode: input.mode,
        location,
        listing,
    };

    let row = session_repo::insert(&state.db, Uuid::new_v4(), &new_session).await?;
    tracing::info!(session_id = %row.id, kind = ?row.kind, "✅ Session created");

    let session = with_participants(&state.db, row).await?;
    if session.kind == SessionKind::Couple {
        realtime::publish_partnership(state, PartnershipChange::WorkSessions {
            event_type: ChangeKind::Insert,
            new: session.clone(),
        })
        .await;
    }
    Ok(session)
}

/// Lists the caller's own sessions, hosted or joined, newest first.
pub async fn list_for_user(state: &AppState, user_id: Uuid, filter: SessionFilter) -> Result<Vec<SessionInfo>> {
    let rows = session_repo::list_for_user(&state.db, user_id, &filter).await?;
    let mut sessions = Vec::with_capacity(rows.len());
    for row in rows {
        sessions.push(with_participants(&state.db, row).await?);
    }
    Ok(sessions)
}

/// Lists a partnership's sessions, including those created before it was deactivated.
pub async fn list_for_partnership(
    state: &AppState,
    user_id: Uuid,
    partnership_id: Uuid,
) -> Result<Vec<SessionInfo>> {
    partnerships::require_member(state, user_id, partnership_id).await?;

    let rows = session_repo::list_for_partnership(&state.db, partnership_id).await?;
    let mut sessions = Vec::with_capacity(rows.len());
    for row in rows {
        sessions.push(with_participants(&state.db, row).await?);
    }
    Ok(sessions)
}
