use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, patch, post},
};
use http::{Method, header};
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_governor::{GovernorLayer, governor::GovernorConfigBuilder};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{handlers, middleware_layer, state::AppState};

/// Builds the full router: REST routes, the live room and the shared layers.
pub fn router(state: AppState) -> anyhow::Result<Router> {
    let origins = state
        .config
        .cors_origins
        .iter()
        .map(|origin| {
            origin
                .parse::<HeaderValue>()
                .with_context(|| format!("Invalid CORS origin `{}`", origin))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let cors = CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::COOKIE,
        ])
        .allow_credentials(true)
        .max_age(Duration::from_secs(86400));

    let governor_conf = Arc::new(
        GovernorConfigBuilder::default()
            .per_second(50)
            .burst_size(200)
            .use_headers()
            .finish()
            .context("Invalid governor configuration")?,
    );

    // Task and reward writes, capped per user.
    let mutation_routes = Router::new()
        .route("/api/sessions/{session_id}/tasks", post(handlers::tasks::create_task))
        .route(
            "/api/tasks/{task_id}",
            patch(handlers::tasks::update_task).delete(handlers::tasks::delete_task),
        )
        .route("/api/sessions/{session_id}/rewards", post(handlers::rewards::create_reward))
        .route("/api/rewards/{reward_id}", patch(handlers::rewards::update_reward))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::rate_limit::rate_limit_mutations,
        ));

    let protected_routes = Router::new()
        .route(
            "/api/partnerships",
            get(handlers::partnerships::list_partnerships)
                .post(handlers::partnerships::create_partnership),
        )
        .route(
            "/api/partnerships/{partnership_id}/deactivate",
            post(handlers::partnerships::deactivate_partnership),
        )
        .route(
            "/api/partnerships/{partnership_id}/sessions",
            get(handlers::sessions::list_partnership_sessions),
        )
        .route(
            "/api/partnerships/{partnership_id}/live",
            get(handlers::live::live_partnership),
        )
        .route(
            "/api/sessions",
            get(handlers::sessions::list_sessions).post(handlers::sessions::create_session),
        )
        .route("/api/sessions/{session_id}", get(handlers::sessions::get_session))
        .route("/api/sessions/{session_id}/live", get(handlers::live::live_session))
        .merge(mutation_routes)
        .layer(GovernorLayer::new(governor_conf))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .with_state(state);

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(DefaultBodyLimit::max(64 * 1024))
                .layer(CookieManagerLayer::new())
                .layer(CompressionLayer::new())
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::default().include_headers(false))
                        .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                        .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                        .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
                ),
        )
        .layer(cors);

    Ok(app)
}
