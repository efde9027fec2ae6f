use axum::{
    Extension,
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::Method;

use crate::{
    error::AppError,
    models::auth::AuthSession,
    state::AppState,
};

const WINDOW_SECONDS: i64 = 60;

/// A middleware that caps task and reward writes per user per minute.
///
/// Reads pass through untouched. Redis failures fail open: the request is
/// served and the error logged.
pub async fn rate_limit_mutations(
    State(state): State<AppState>,
    Extension(session): Extension<AuthSession>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if matches!(*req.method(), Method::GET | Method::HEAD | Method::OPTIONS) {
        return next.run(req).await;
    }

    let key = format!("rate_limit:mutations:{}", session.user_id);
    let mut redis = state.redis.clone();

    let count: i64 = match redis::cmd("INCR").arg(&key).query_async(&mut redis).await {
        Ok(count) => count,
        Err(e) => {
            tracing::warn!("⚠️ Rate limit check failed: {}", e);
            return next.run(req).await;
        }
    };

    if count == 1 {
        let _: () = redis::cmd("EXPIRE")
            .arg(&key)
            .arg(WINDOW_SECONDS)
            .query_async(&mut redis)
            .await
            .unwrap_or(());
    }

    if count > i64::from(state.config.mutation_rate_limit_per_minute) {
        let ttl: Option<i64> = redis::cmd("TTL")
            .arg(&key)
            .query_async(&mut redis)
            .await
            .unwrap_or(None);

        return AppError::RateLimitExceeded(format!(
            "Too many changes. Try again in {} seconds",
            ttl.unwrap_or(WINDOW_SECONDS).max(1)
        ))
        .into_response();
    }

    next.run(req).await
}
