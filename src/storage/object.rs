use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt;
use object_store::{
    aws::AmazonS3Builder, path::Path, MultipartUpload as ObjectMultipart, ObjectStore, PutPayload,
};
use tokio_util::io::StreamReader;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::S3Config,
    error::{AppError, Result},
    storage::blob::{BlobReader, BlobStore, MultipartUpload},
};

/// Object storage rejects multipart parts smaller than this, except the last one.
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

fn map_not_found(e: object_store::Error, key: Uuid) -> AppError {
    match e {
        object_store::Error::NotFound { .. } => {
            AppError::NotFound(format!("blob {} not found", key))
        }
        other => AppError::ObjectStore(other),
    }
}

/// A [`BlobStore`] on top of any [`ObjectStore`], S3 in production.
#[derive(Clone)]
pub struct ObjectBlobStore {
    store: Arc<dyn ObjectStore>,
}

impl ObjectBlobStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    /// Builds an S3-compatible backend from the configuration.
    pub fn from_s3(config: &S3Config) -> Result<Self> {
        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_access_key_id(config.access_key_id.as_str())
            .with_secret_access_key(config.secret_access_key.as_str());

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint).with_allow_http(true);
        }

        let store = builder.build()?;
        info!(bucket = %config.bucket, "Object blob store initialized");
        Ok(Self::new(Arc::new(store)))
    }

    fn location(key: Uuid) -> Path {
        Path::from(key.to_string())
    }
}

/// Buffers incoming chunks until a full part can be sent upstream.
struct ObjectUpload {
    key: Uuid,
    inner: Box<dyn ObjectMultipart>,
    buffer: Vec<u8>,
    parts: usize,
    finished: bool,
}

impl ObjectUpload {
    async fn flush_part(&mut self) -> Result<()> {
        let part = std::mem::take(&mut self.buffer);
        let size = part.len();
        self.inner.put_part(PutPayload::from(part)).await?;
        self.parts += 1;
        debug!(key = %self.key, part = self.parts, size, "Uploaded blob part");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.finished {
            return Err(AppError::Internal(format!("upload of {} already finished", self.key)));
        }
        Ok(())
    }
}

#[async_trait]
impl MultipartUpload for ObjectUpload {
    async fn upload(&mut self, chunk: Bytes) -> Result<()> {
        self.ensure_open()?;
        self.buffer.extend_from_slice(&chunk);
        if self.buffer.len() >= MIN_PART_SIZE {
            self.flush_part().await?;
        }
        Ok(())
    }

    async fn complete(&mut self) -> Result<()> {
        self.ensure_open()?;
        if !self.buffer.is_empty() || self.parts == 0 {
            self.flush_part().await?;
        }
        self.inner.complete().await?;
        self.finished = true;
        debug!(key = %self.key, parts = self.parts, "Stored blob");
        Ok(())
    }

    async fn abort(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;
        self.buffer.clear();
        self.inner.abort().await?;
        debug!(key = %self.key, "Aborted blob upload");
        Ok(())
    }
}

#[async_trait]
impl BlobStore for ObjectBlobStore {
    async fn start_upload(&self, key: Uuid) -> Result<Box<dyn MultipartUpload>> {
        let inner = self.store.put_multipart(&Self::location(key)).await?;
        Ok(Box::new(ObjectUpload {
            key,
            inner,
            buffer: Vec::with_capacity(MIN_PART_SIZE),
            parts: 0,
            finished: false,
        }))
    }

    async fn start_download(&self, key: Uuid) -> Result<BlobReader> {
        let result = self
            .store
            .get(&Self::location(key))
            .await
            .map_err(|e| map_not_found(e, key))?;

        let stream = result.into_stream().map_err(std::io::Error::other);
        Ok(Box::pin(StreamReader::new(stream)))
    }

    async fn delete(&self, key: Uuid) -> Result<()> {
        let location = Self::location(key);
        self.store
            .head(&location)
            .await
            .map_err(|e| map_not_found(e, key))?;
        self.store.delete(&location).await?;
        debug!(key = %key, "Deleted blob");
        Ok(())
    }
}
