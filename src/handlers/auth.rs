use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::{
    error::Result,
    handlers::json::JsonBody,
    protocol::{AuthRequest, PingResponse, TokenResponse},
    services::auth as auth_service,
    state::AppState,
};

/// Liveness check.
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse {
        answer: "pong!".to_string(),
    })
}

/// Handles user registration.
#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<AuthRequest>,
) -> Result<impl IntoResponse> {
    tracing::info!("📝 Register attempt: {}", payload.login);

    let token = auth_service::register(&state, &payload.login, &payload.password).await?;

    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

/// Handles user login.
#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    JsonBody(payload): JsonBody<AuthRequest>,
) -> Result<Json<TokenResponse>> {
    tracing::info!("🔐 Login attempt: {}", payload.login);

    let token = auth_service::login(&state, &payload.login, &payload.password).await?;

    Ok(Json(TokenResponse { token }))
}
