use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};

use crate::{
    error::{AppError, Result},
    handlers::json::JsonBody,
    models::user::User,
    protocol::{
        SecretListResponse, SecretResponse, SecretSetRequest, SecretType, SecretUpdateRequest,
    },
    services::secrets as secret_service,
    state::AppState,
};

fn parse_type(raw: &str) -> Result<SecretType> {
    raw.parse().map_err(AppError::InvalidArgument)
}

/// Lists the caller's secrets of one type.
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(secret_type): Path<String>,
) -> Result<Json<SecretListResponse>> {
    let secrets = secret_service::list(&state, &user, parse_type(&secret_type)?).await?;
    Ok(Json(SecretListResponse { secrets }))
}

/// Stores a new secret.
pub async fn set(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(secret_type): Path<String>,
    JsonBody(payload): JsonBody<SecretSetRequest>,
) -> Result<StatusCode> {
    secret_service::set(
        &state,
        &user,
        parse_type(&secret_type)?,
        &payload.name,
        &payload.content,
    )
    .await?;
    Ok(StatusCode::CREATED)
}

/// Returns one secret with its content.
pub async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((secret_type, name)): Path<(String, String)>,
) -> Result<Json<SecretResponse>> {
    let secret = secret_service::get(&state, &user, parse_type(&secret_type)?, &name).await?;
    Ok(Json(secret))
}

/// Replaces the content of an existing secret.
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((secret_type, name)): Path<(String, String)>,
    JsonBody(payload): JsonBody<SecretUpdateRequest>,
) -> Result<StatusCode> {
    secret_service::update(&state, &user, parse_type(&secret_type)?, &name, &payload.content)
        .await?;
    Ok(StatusCode::OK)
}

/// Deletes a secret.
pub async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path((secret_type, name)): Path<(String, String)>,
) -> Result<StatusCode> {
    secret_service::delete(&state, &user, parse_type(&secret_type)?, &name).await?;
    Ok(StatusCode::OK)
}
