use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    storage::blob::{BlobReader, BlobStore, MultipartUpload},
};

fn blob_not_found(key: Uuid) -> AppError {
    AppError::NotFound(format!("blob {} not found", key))
}

/// A [`BlobStore`] that keeps every blob as a file named after its key.
///
/// In-progress uploads are written to `<key>.part` and renamed into place on
/// completion, so a reader never observes a partial blob.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    base_path: PathBuf,
}

impl LocalBlobStore {
    pub async fn new(base_path: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            tracing::error!(
                "❌ Failed to create blob directory '{}': {}",
                base_path.display(),
                e
            );
            AppError::Io(e)
        })?;

        info!(path = %base_path.display(), "Blob store initialized");
        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn blob_path(&self, key: Uuid) -> PathBuf {
        self.base_path.join(key.to_string())
    }

    fn part_path(&self, key: Uuid) -> PathBuf {
        self.base_path.join(format!("{}.part", key))
    }
}

struct LocalUpload {
    key: Uuid,
    blob_path: PathBuf,
    part_path: PathBuf,
    file: Option<File>,
    written: u64,
}

impl LocalUpload {
    fn file(&mut self) -> Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| AppError::Internal(format!("upload of {} already finished", self.key)))
    }
}

#[async_trait]
impl MultipartUpload for LocalUpload {
    async fn upload(&mut self, chunk: Bytes) -> Result<()> {
        self.file()?.write_all(&chunk).await?;
        self.written += chunk.len() as u64;
        Ok(())
    }

    async fn complete(&mut self) -> Result<()> {
        let file = self.file()?;
        file.flush().await?;
        file.sync_all().await?;
        self.file = None;

        fs::rename(&self.part_path, &self.blob_path).await?;
        debug!(key = %self.key, size = self.written, "Stored blob");
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        self.file = None;
        match fs::remove_file(&self.part_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(key = %self.key, "Aborted blob upload");
        Ok(())
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn start_upload(&self, key: Uuid) -> Result<Box<dyn MultipartUpload>> {
        let blob_path = self.blob_path(key);
        if fs::try_exists(&blob_path).await? {
            return Err(AppError::AlreadyExists(format!("blob {} already exists", key)));
        }

        let part_path = self.part_path(key);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&part_path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => {
                    AppError::AlreadyExists(format!("upload of {} already in progress", key))
                }
                _ => AppError::Io(e),
            })?;

        Ok(Box::new(LocalUpload {
            key,
            blob_path,
            part_path,
            file: Some(file),
            written: 0,
        }))
    }

    async fn start_download(&self, key: Uuid) -> Result<BlobReader> {
        let file = File::open(self.blob_path(key)).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => blob_not_found(key),
            _ => AppError::Io(e),
        })?;
        Ok(Box::pin(file))
    }

    async fn delete(&self, key: Uuid) -> Result<()> {
        fs::remove_file(self.blob_path(key)).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => blob_not_found(key),
            _ => AppError::Io(e),
        })?;
        debug!(key = %key, "Deleted blob");
        Ok(())
    }
}
