use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use redis::AsyncCommands;
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::{
    error::AppError,
    models::auth::AuthSession,
    state::AppState,
};

/// Extracts the auth token from the `session_id` cookie or a bearer header.
///
/// # Arguments
///
/// * `cookies` - The request cookies.
/// * `request` - The incoming request.
///
/// # Returns
///
/// An `Option` containing the token if one is present and well formed.
fn extract_token(cookies: &Cookies, request: &Request<Body>) -> Option<Uuid> {
    if let Some(token) = cookies
        .get("session_id")
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
    {
        return Some(token);
    }

    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .and_then(|token| Uuid::parse_str(token.trim()).ok())
}

/// Looks up an auth token in Redis, dropping it when expired.
pub async fn resolve_session(state: &AppState, token: Uuid) -> Result<AuthSession, AppError> {
    let key = format!("session:{}", token);
    let mut redis = state.redis.clone();

    let session_json: Option<String> = redis.get(&key).await?;
    let session_json = session_json
        .ok_or_else(|| AppError::Authentication("Session not found".to_string()))?;

    let session: AuthSession = sonic_rs::from_str(&session_json).map_err(|e| {
        tracing::warn!("❌ Invalid session JSON: {}", e);
        AppError::Authentication("Invalid session".to_string())
    })?;

    if session.is_expired(chrono::Utc::now()) {
        tracing::warn!("❌ Session expired for user: {}", session.user_id);
        let _: () = redis.del(&key).await.unwrap_or(());
        return Err(AppError::Authentication("Session expired".to_string()));
    }

    Ok(session)
}

/// A middleware that requires a valid auth token.
///
/// On success the resolved [`AuthSession`] is stored in the request
/// extensions for handlers to pick up.
pub async fn require_auth(
    State(state): State<AppState>,
    cookies: Cookies,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    tracing::debug!("🔐 Checking authentication...");

    let Some(token) = extract_token(&cookies, &request) else {
        tracing::warn!("❌ No auth token found");
        return AppError::Authentication("Missing credentials".to_string()).into_response();
    };

    let session = match resolve_session(&state, token).await {
        Ok(session) => session,
        Err(e) => return e.into_response(),
    };

    tracing::debug!("✅ User authenticated: {}", session.user_id);
    request.extensions_mut().insert(session);

    next.run(request).await
}
