use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_governor::{governor::GovernorConfigBuilder, GovernorLayer};
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::{
    error::{AppError, Result},
    handlers, middleware_layer,
    state::AppState,
};

/// Limit for JSON bodies. Media uploads stream and are not subject to it.
const JSON_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Seconds needed to replenish one register/login attempt per peer address.
const AUTH_REPLENISH_SECS: u64 = 2;
/// Register/login attempts a peer address may burst.
const AUTH_BURST: u32 = 10;

/// Builds the full application router.
///
/// Every route except ping, register and login passes through the auth gate.
/// Serving it with per-peer rate limiting enabled requires
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn app(state: AppState) -> Result<Router> {
    let mut auth_routes = Router::new()
        .route("/api/auth/register", post(handlers::auth::register))
        .route("/api/auth/login", post(handlers::auth::login));

    if state.config.rate_limit {
        let governor_conf = Arc::new(
            GovernorConfigBuilder::default()
                .per_second(AUTH_REPLENISH_SECS)
                .burst_size(AUTH_BURST)
                .use_headers()
                .finish()
                .ok_or_else(|| AppError::Internal("Invalid rate limit configuration".to_string()))?,
        );
        auth_routes = auth_routes.layer(GovernorLayer::new(governor_conf));
    }

    let secret_routes = Router::new()
        .route(
            "/api/secrets/{secret_type}",
            get(handlers::secrets::list).post(handlers::secrets::set),
        )
        .route(
            "/api/secrets/{secret_type}/{name}",
            get(handlers::secrets::get)
                .put(handlers::secrets::update)
                .delete(handlers::secrets::delete),
        )
        .route("/api/media", post(handlers::media::upload))
        .route("/api/media/{name}", get(handlers::media::download));

    let app = Router::new()
        .route("/api/ping", get(handlers::auth::ping))
        .merge(auth_routes)
        .merge(secret_routes)
        .layer(from_fn_with_state(
            state.clone(),
            middleware_layer::auth::require_auth,
        ))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false))
                .on_request(DefaultOnRequest::default().level(Level::DEBUG))
                .on_response(DefaultOnResponse::default().level(Level::DEBUG))
                .on_failure(DefaultOnFailure::default().level(Level::ERROR)),
        )
        .layer(DefaultBodyLimit::max(JSON_BODY_LIMIT))
        .with_state(state);

    Ok(app)
}
