use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::Response,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::Result,
    handlers::response::json_response,
    models::{
        auth::AuthSession,
        session::{ListingStatus, PartnerPrefs, SessionFilter, SessionKind, SessionMode},
    },
    services::sessions::{self as session_service, CreateSession},
    state::AppState,
    sync::visibility::project_with,
};

/// The request payload for scheduling a session.
#[derive(Deserialize)]
pub struct CreateSessionRequest {
    /// Omit for a solo session.
    #[serde(default)]
    pub partnership_id: Option<Uuid>,
    pub title: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub mode: SessionMode,
    #[serde(default)]
    pub location: Option<String>,
    /// Solo listing details.
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub partner_prefs: Option<PartnerPrefs>,
}

/// Filters accepted by the session list.
#[derive(Debug, Default, Deserialize)]
pub struct ListSessionsQuery {
    pub kind: Option<SessionKind>,
    pub mode: Option<SessionMode>,
    pub status: Option<ListingStatus>,
    pub date: Option<NaiveDate>,
}

impl From<ListSessionsQuery> for SessionFilter {
    fn from(query: ListSessionsQuery) -> Self {
        Self {
            kind: query.kind,
            mode: query.mode,
            status: query.status,
            date: query.date,
        }
    }
}

/// Creates a couple or solo session.
#[axum::debug_handler]
pub async fn create_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<CreateSessionRequest>,
) -> Result<Response> {
    let session = session_service::create_session(
        &state,
        auth.user_id,
        CreateSession {
            partnership_id: req.partnership_id,
            title: req.title,
            start_time: req.start_time,
            end_time: req.end_time,
            mode: req.mode,
            location: req.location,
            description: req.description,
            tech_stack: req.tech_stack,
            partner_prefs: req.partner_prefs,
        },
    )
    .await?;

    json_response(StatusCode::CREATED, &session)
}

/// Lists the caller's sessions, optionally filtered by kind, mode, listing status and day.
#[axum::debug_handler]
pub async fn list_sessions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Response> {
    let sessions = session_service::list_for_user(&state, auth.user_id, query.into()).await?;
    json_response(StatusCode::OK, &sessions)
}

/// Hydrates a session for the caller, through the visibility filter.
#[axum::debug_handler]
pub async fn get_session(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(session_id): Path<Uuid>,
) -> Result<Response> {
    let snapshot = session_service::load_snapshot(&state.db, session_id, auth.user_id).await?;
    let projection = project_with(&snapshot, auth.user_id, state.config.reward_reveal);

    json_response(StatusCode::OK, &projection)
}

/// Lists the sessions of a partnership the caller belongs to.
#[axum::debug_handler]
pub async fn list_partnership_sessions(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(partnership_id): Path<Uuid>,
) -> Result<Response> {
    let sessions = session_service::list_for_partnership(&state, auth.user_id, partnership_id).await?;
    json_response(StatusCode::OK, &sessions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_maps_onto_the_filter() {
        let uri: http::Uri = "/api/sessions?kind=solo&mode=offline&date=2026-03-14".parse().unwrap();
        let Query(query) = Query::<ListSessionsQuery>::try_from_uri(&uri).unwrap();
        let filter = SessionFilter::from(query);

        assert_eq!(filter.kind, Some(SessionKind::Solo));
        assert_eq!(filter.mode, Some(SessionMode::Offline));
        assert_eq!(filter.status, None);
        assert_eq!(filter.date, NaiveDate::from_ymd_opt(2026, 3, 14));
    }
}
