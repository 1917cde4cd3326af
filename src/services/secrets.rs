use crate::{
    error::{AppError, Result},
    models::user::User,
    protocol::{SecretInfo, SecretResponse, SecretType},
    repositories::metadata::transaction,
    state::AppState,
    validation::secret::validate_secret_name,
};

fn reject_media(secret_type: SecretType) -> Result<()> {
    if secret_type == SecretType::Media {
        return Err(AppError::InvalidArgument(
            "Media content is transferred with the media upload and download calls".to_string(),
        ));
    }
    Ok(())
}

/// Lists the caller's secrets of one type. Content is never included.
pub async fn list(state: &AppState, user: &User, secret_type: SecretType) -> Result<Vec<SecretInfo>> {
    let secrets = state
        .bounded(
            state
                .metadata
                .get_user_secrets_metadata_by_type(user.uuid, secret_type),
        )
        .await?;

    Ok(secrets.iter().map(SecretInfo::from).collect())
}

/// Stores a new plain secret. The content is opaque to the server.
pub async fn set(
    state: &AppState,
    user: &User,
    secret_type: SecretType,
    name: &str,
    content: &[u8],
) -> Result<()> {
    reject_media(secret_type)?;
    validate_secret_name(name)?;

    let meta = state
        .bounded(
            state
                .metadata
                .add_plain_secret(user.uuid, name, secret_type, content),
        )
        .await?;

    tracing::info!(
        login = %user.login,
        name = %name,
        secret_type = %secret_type,
        uuid = %meta.uuid,
        "Secret stored"
    );
    Ok(())
}

/// Returns a plain secret exactly as it was stored.
pub async fn get(
    state: &AppState,
    user: &User,
    secret_type: SecretType,
    name: &str,
) -> Result<SecretResponse> {
    reject_media(secret_type)?;

    let secret = state
        .bounded(
            state
                .metadata
                .get_user_secret_by_name(user.uuid, name, secret_type),
        )
        .await?;

    let content = secret.data.ok_or_else(|| {
        tracing::error!(
            login = %user.login,
            name = %name,
            uuid = %secret.meta.uuid,
            "Plain secret has no content"
        );
        AppError::Internal("Secret content is missing".to_string())
    })?;

    Ok(SecretResponse {
        name: secret.meta.name,
        secret_type: secret.meta.secret_type,
        content,
        created: secret.meta.created_at,
        updated: secret.meta.updated_at,
    })
}

/// Replaces the content of an existing plain secret. Never creates one.
pub async fn update(
    state: &AppState,
    user: &User,
    secret_type: SecretType,
    name: &str,
    content: &[u8],
) -> Result<()> {
    reject_media(secret_type)?;

    state
        .bounded(
            state
                .metadata
                .update_plain_secret_data(user.uuid, name, secret_type, content),
        )
        .await?;

    tracing::info!(login = %user.login, name = %name, secret_type = %secret_type, "Secret updated");
    Ok(())
}

/// Deletes a secret of any type.
///
/// For media the blob goes first and the metadata second, so a failure in
/// between leaves a record whose download reports the inconsistency rather
/// than an unreachable blob.
pub async fn delete(state: &AppState, user: &User, secret_type: SecretType, name: &str) -> Result<()> {
    if secret_type == SecretType::Media {
        return delete_media(state, user, name).await;
    }

    let owner = user.uuid;
    let secret_name = name.to_string();
    state
        .bounded(state.metadata.in_transaction(transaction(move |tx| {
            Box::pin(async move {
                let secret = tx
                    .get_user_secret_by_name(owner, &secret_name, secret_type)
                    .await?;
                tx.remove_secret_by_uuid(secret.meta.uuid).await
            })
        })))
        .await?;

    tracing::info!(login = %user.login, name = %name, secret_type = %secret_type, "Secret deleted");
    Ok(())
}

async fn delete_media(state: &AppState, user: &User, name: &str) -> Result<()> {
    let secret = state
        .bounded(
            state
                .metadata
                .get_user_secret_by_name(user.uuid, name, SecretType::Media),
        )
        .await?;
    let key = secret.meta.uuid;

    match state.bounded(state.blobs.delete(key)).await {
        Ok(()) => {}
        Err(AppError::NotFound(_)) => {
            tracing::warn!(login = %user.login, name = %name, uuid = %key, "Media blob already gone");
        }
        Err(e) => {
            tracing::error!(
                login = %user.login,
                name = %name,
                uuid = %key,
                error = %e,
                "Cannot delete media blob"
            );
            return Err(e);
        }
    }

    state.bounded(state.metadata.remove_secret_by_uuid(key)).await?;

    tracing::info!(login = %user.login, name = %name, uuid = %key, "Media secret deleted");
    Ok(())
}
