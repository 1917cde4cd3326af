use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request},
    middleware::Next,
    response::Response,
};

use crate::{error::AppError, services::auth as auth_service, state::AppState};

/// Paths reachable without a bearer token.
pub const PUBLIC_PATHS: [&str; 3] = ["/api/ping", "/api/auth/register", "/api/auth/login"];

/// Extracts the bearer token from the `Authorization` header.
///
/// # Arguments
///
/// * `headers` - The request headers.
///
/// # Returns
///
/// An `Option` containing the token if a well-formed header is present.
fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// A middleware that resolves the caller of every non-public route.
///
/// The resolved [`crate::models::user::User`] is inserted into the request
/// extensions before the handler runs, so streaming handlers hold it for the
/// whole transfer.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `request` - The incoming request.
/// * `next` - The next middleware in the chain.
///
/// # Returns
///
/// A `Response` or an `Unauthenticated` error.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    if PUBLIC_PATHS.contains(&request.uri().path()) {
        return Ok(next.run(request).await);
    }

    tracing::debug!("🔐 Checking authentication...");

    let token = extract_bearer_token(request.headers())
        .map(str::to_owned)
        .ok_or_else(|| {
            tracing::warn!("❌ No bearer token on {}", request.uri().path());
            AppError::Unauthenticated("This method requires a bearer token".to_string())
        })?;

    let user = auth_service::authenticate(&state, &token).await?;

    tracing::debug!("✅ User authenticated: {}", user.login);
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
