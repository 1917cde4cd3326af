//! Media transfer.
//!
//! Upload order is fixed: the new blob is durable before any metadata points
//! at it, and the metadata points at the new blob before the old one is
//! deleted. Whatever fails in between, the name keeps resolving to a complete
//! blob.

use bytes::Bytes;
use futures::{stream::BoxStream, Stream, StreamExt};
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::user::User,
    protocol::{MediaUploadResponse, SecretType, UploadFrame, TRANSFER_CHUNK_SIZE},
    repositories::metadata::transaction,
    state::AppState,
    storage::blob::MultipartUpload,
    validation::secret::validate_secret_name,
};

/// Owns an open multipart upload until it is completed or aborted.
///
/// Dropping the guard with the upload still open (the client went away and
/// the handler future was cancelled) aborts it on a background task.
struct UploadGuard {
    key: Uuid,
    upload: Option<Box<dyn MultipartUpload>>,
}

impl UploadGuard {
    fn new(key: Uuid, upload: Box<dyn MultipartUpload>) -> Self {
        Self {
            key,
            upload: Some(upload),
        }
    }

    fn open(&mut self) -> Result<&mut Box<dyn MultipartUpload>> {
        self.upload
            .as_mut()
            .ok_or_else(|| AppError::Internal(format!("upload of {} is closed", self.key)))
    }

    async fn upload(&mut self, chunk: Bytes) -> Result<()> {
        self.open()?.upload(chunk).await
    }

    async fn complete(&mut self) -> Result<()> {
        self.open()?.complete().await?;
        self.upload = None;
        Ok(())
    }

    async fn abort(&mut self) {
        if let Some(mut upload) = self.upload.take() {
            if let Err(e) = upload.abort().await {
                tracing::error!(uuid = %self.key, error = %e, "Cannot abort media upload");
            }
        }
    }
}

impl Drop for UploadGuard {
    fn drop(&mut self) {
        let Some(mut upload) = self.upload.take() else {
            return;
        };
        let key = self.key;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    match upload.abort().await {
                        Ok(()) => tracing::warn!(uuid = %key, "Abandoned media upload aborted"),
                        Err(e) => {
                            tracing::error!(uuid = %key, error = %e, "Cannot abort abandoned media upload")
                        }
                    }
                });
            }
            Err(_) => tracing::error!(uuid = %key, "Media upload abandoned outside a runtime"),
        }
    }
}

/// Keeps the taxonomy errors a caller can act on and masks the rest.
fn surface(e: AppError, context: &str) -> AppError {
    match e {
        AppError::NotFound(_)
        | AppError::AlreadyExists(_)
        | AppError::InvalidArgument(_)
        | AppError::DeadlineExceeded(_)
        | AppError::DataLoss(_) => e,
        other => {
            tracing::error!(error = %other, "{}", context);
            AppError::Internal(context.to_string())
        }
    }
}

async fn next_frame<S>(state: &AppState, frames: &mut S) -> Result<Option<UploadFrame>>
where
    S: Stream<Item = Result<UploadFrame>> + Unpin,
{
    match tokio::time::timeout(state.config.storage_timeout, frames.next()).await {
        Ok(frame) => frame.transpose(),
        Err(_) => Err(AppError::DeadlineExceeded(
            "Timed out waiting for the next upload frame".to_string(),
        )),
    }
}

async fn receive_chunks<S>(state: &AppState, guard: &mut UploadGuard, frames: &mut S) -> Result<u64>
where
    S: Stream<Item = Result<UploadFrame>> + Unpin,
{
    let mut received = 0u64;
    while let Some(frame) = next_frame(state, frames).await? {
        let chunk = match frame {
            UploadFrame::Chunk(data) if !data.is_empty() => data,
            _ => {
                return Err(AppError::InvalidArgument(
                    "Frames after the metadata frame must be non-empty data chunks".to_string(),
                ))
            }
        };

        let size = chunk.len();
        state
            .bounded(guard.upload(Bytes::from(chunk)))
            .await
            .map_err(|e| surface(e, "Server cannot save data chunk"))?;
        received += size as u64;
        tracing::debug!(uuid = %guard.key, size, received, "Media chunk stored");
    }
    Ok(received)
}

/// Receives a media upload and commits it under the caller's name.
///
/// The first frame must be `UploadFrame::Metadata`. With `overwrite = false`
/// the name must be free (`AlreadyExists` otherwise); with `overwrite = true`
/// it must already exist (`NotFound` otherwise). Every upload goes to a brand
/// new blob key, so an aborted overwrite leaves the previous content intact.
pub async fn upload<S>(state: &AppState, user: &User, mut frames: S) -> Result<MediaUploadResponse>
where
    S: Stream<Item = Result<UploadFrame>> + Unpin,
{
    let _permit = state.upload_limiter.acquire().await?;

    let (name, overwrite) = match next_frame(state, &mut frames).await? {
        Some(UploadFrame::Metadata { name, overwrite }) => (name, overwrite),
        Some(UploadFrame::Chunk(_)) | None => {
            tracing::warn!(login = %user.login, "Media upload without a metadata frame");
            return Err(AppError::InvalidArgument(
                "First frame must be media metadata".to_string(),
            ));
        }
    };
    validate_secret_name(&name)?;

    tracing::info!(login = %user.login, name = %name, overwrite, "User sends new media");

    let existing = match state
        .bounded(
            state
                .metadata
                .get_user_secret_by_name(user.uuid, &name, SecretType::Media),
        )
        .await
    {
        Ok(secret) => Some(secret.meta.uuid),
        Err(AppError::NotFound(_)) => None,
        Err(e) => return Err(surface(e, "Cannot check existing media secret")),
    };

    let replaced = match (overwrite, existing) {
        (false, Some(_)) => {
            return Err(AppError::AlreadyExists(format!(
                "Cannot create existing media secret {:?}",
                name
            )))
        }
        (true, None) => {
            return Err(AppError::NotFound(format!(
                "Cannot overwrite not existing media {:?}",
                name
            )))
        }
        (_, existing) => existing,
    };

    let media_uuid = Uuid::new_v4();
    let upload = state
        .bounded(state.blobs.start_upload(media_uuid))
        .await
        .map_err(|e| surface(e, "Cannot start media upload"))?;
    let mut guard = UploadGuard::new(media_uuid, upload);

    let received = match receive_chunks(state, &mut guard, &mut frames).await {
        Ok(received) => received,
        Err(e) => {
            tracing::warn!(login = %user.login, name = %name, error = %e, "Media upload failed");
            guard.abort().await;
            return Err(e);
        }
    };

    if let Err(e) = state.bounded(guard.complete()).await {
        guard.abort().await;
        return Err(surface(e, "Server cannot complete data upload"));
    }

    match replaced {
        None => {
            let added = state
                .bounded(state.metadata.add_secret_metadata(
                    user.uuid,
                    media_uuid,
                    &name,
                    SecretType::Media,
                ))
                .await;
            if let Err(e) = added {
                discard_blob(state, media_uuid).await;
                return Err(surface(e, "Cannot add media secret to metadata store"));
            }
        }
        Some(old_uuid) => {
            let owner = user.uuid;
            let repointed = state
                .bounded(state.metadata.in_transaction(transaction(move |tx| {
                    Box::pin(async move {
                        tx.update_secret_metadata_uuid(owner, old_uuid, media_uuid, SecretType::Media)
                            .await
                    })
                })))
                .await;
            if let Err(e) = repointed {
                discard_blob(state, media_uuid).await;
                return Err(surface(e, "Cannot point media secret at the new content"));
            }

            let blobs = state.blobs.clone();
            let login = user.login.clone();
            tokio::spawn(async move {
                if let Err(e) = blobs.delete(old_uuid).await {
                    tracing::error!(login = %login, uuid = %old_uuid, error = %e, "Cannot delete old media");
                }
            });
        }
    }

    tracing::info!(
        login = %user.login,
        name = %name,
        uuid = %media_uuid,
        size = received,
        "✅ Media stored"
    );
    Ok(MediaUploadResponse {
        uuid: media_uuid,
        name,
    })
}

/// Best-effort removal of a completed blob that no metadata will reference.
async fn discard_blob(state: &AppState, key: Uuid) {
    if let Err(e) = state.bounded(state.blobs.delete(key)).await {
        tracing::error!(uuid = %key, error = %e, "Cannot clean up orphaned media blob");
    }
}

/// Opens a media secret for streaming.
///
/// The stream yields chunks of at most [`TRANSFER_CHUNK_SIZE`] bytes and holds
/// a download slot until it is dropped. A read error ends it with that error.
pub async fn download(
    state: &AppState,
    user: &User,
    name: &str,
) -> Result<BoxStream<'static, std::io::Result<Bytes>>> {
    let permit = state.download_limiter.acquire().await?;

    tracing::info!(login = %user.login, name = %name, "User requests media");

    let secret = state
        .bounded(
            state
                .metadata
                .get_user_secret_by_name(user.uuid, name, SecretType::Media),
        )
        .await?;
    let key = secret.meta.uuid;

    let reader = match state.bounded(state.blobs.start_download(key)).await {
        Ok(reader) => reader,
        Err(AppError::NotFound(_)) => {
            tracing::error!(login = %user.login, name = %name, uuid = %key, "Media metadata has no blob");
            return Err(AppError::Internal(
                "Cannot start media download from storage".to_string(),
            ));
        }
        Err(e) => return Err(surface(e, "Cannot start media download from storage")),
    };

    let login = user.login.clone();
    Ok(ReaderStream::with_capacity(reader, TRANSFER_CHUNK_SIZE).map(move |chunk| {
        let _slot = &permit;
        chunk.map_err(|e| {
            tracing::error!(login = %login, uuid = %key, error = %e, "Media read failed mid-stream");
            e
        })
    })
    .boxed())
}
