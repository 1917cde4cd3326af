use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{AppError, Result};
use crate::models::user::User;
use crate::state::AppState;
use crate::validation::auth::validate_credentials;

/// Runs Argon2 off the async workers.
async fn hash_password(state: &AppState, password: &str) -> Result<String> {
    let hasher = state.passwords.clone();
    let password = Zeroizing::new(password.to_string());
    tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| AppError::Internal(format!("Hashing task failed: {}", e)))?
}

async fn verify_password(state: &AppState, password: &str, hash: &str) -> Result<bool> {
    let hasher = state.passwords.clone();
    let password = Zeroizing::new(password.to_string());
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("Verification task failed: {}", e)))?
}

/// Creates an account and returns a bearer token for it.
///
/// # Arguments
///
/// * `state` - The application state.
/// * `login` - The requested login; collisions fail with `AlreadyExists`.
/// * `password` - The plaintext password.
///
/// # Returns
///
/// A `Result` containing the signed token.
pub async fn register(state: &AppState, login: &str, password: &str) -> Result<String> {
    validate_credentials(login, password)?;

    let password_hash = hash_password(state, password).await?;
    let user = state
        .bounded(state.metadata.create_user(login, &password_hash))
        .await?;

    tracing::info!("✅ User registered: {} ({})", user.login, user.uuid);
    state.tokens.issue(user.uuid)
}

/// Checks a login/password pair and returns a fresh bearer token.
///
/// An unknown login is `NotFound`; a wrong password is `Unauthenticated`.
pub async fn login(state: &AppState, login: &str, password: &str) -> Result<String> {
    validate_credentials(login, password)?;

    let user = state.bounded(state.metadata.get_user_by_login(login)).await?;

    if !verify_password(state, password, &user.password_hash).await? {
        tracing::warn!("❌ Wrong password for user: {}", user.login);
        return Err(AppError::Unauthenticated(
            "Invalid login or password".to_string(),
        ));
    }

    tracing::info!("✅ User logged in: {}", user.login);
    state.tokens.issue(user.uuid)
}

/// Resolves a bearer token to the user it was issued for.
///
/// Any failure, including a token for a user that no longer exists, is
/// `Unauthenticated`.
pub async fn authenticate(state: &AppState, token: &str) -> Result<User> {
    let user_uuid: Uuid = state.tokens.verify(token)?;

    match state.bounded(state.metadata.get_user_by_uuid(user_uuid)).await {
        Ok(user) => Ok(user),
        Err(AppError::NotFound(_)) => Err(AppError::Unauthenticated(
            "Token refers to an unknown user".to_string(),
        )),
        Err(e) => Err(e),
    }
}
