use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    error::Result,
    handlers::response::json_response,
    models::auth::AuthSession,
    services::partnerships as partnership_service,
    state::AppState,
};

#[derive(Deserialize)]
pub struct CreatePartnershipRequest {
    pub partner_user_id: Uuid,
}

#[axum::debug_handler]
pub async fn list_partnerships(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
) -> Result<Response> {
    let partnerships = partnership_service::list_active(&state, auth.user_id).await?;
    json_response(StatusCode::OK, &partnerships)
}

#[axum::debug_handler]
pub async fn create_partnership(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Json(req): Json<CreatePartnershipRequest>,
) -> Result<Response> {
    let partnership = partnership_service::create(&state, auth.user_id, req.partner_user_id).await?;
    json_response(StatusCode::CREATED, &partnership)
}

#[axum::debug_handler]
pub async fn deactivate_partnership(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthSession>,
    Path(partnership_id): Path<Uuid>,
) -> Result<Response> {
    let partnership = partnership_service::deactivate(&state, auth.user_id, partnership_id).await?;
    json_response(StatusCode::OK, &partnership)
}
