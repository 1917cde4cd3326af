use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::error::Result;

/// A readable, single-pass blob stream.
pub type BlobReader = Pin<Box<dyn AsyncRead + Send>>;

/// An object being assembled from sequential parts.
///
/// Nothing is retrievable under the key until [`MultipartUpload::complete`]
/// succeeds. [`MultipartUpload::abort`] must leave no object behind and may be
/// called after any partial failure.
#[async_trait]
pub trait MultipartUpload: Send {
    async fn upload(&mut self, chunk: Bytes) -> Result<()>;

    async fn complete(&mut self) -> Result<()>;

    async fn abort(&mut self) -> Result<()>;
}

/// Storage for media content, keyed by secret identity.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn start_upload(&self, key: Uuid) -> Result<Box<dyn MultipartUpload>>;

    /// Opens a blob for reading; `NotFound` if absent.
    async fn start_download(&self, key: Uuid) -> Result<BlobReader>;

    /// Removes a blob; `NotFound` if absent.
    async fn delete(&self, key: Uuid) -> Result<()>;
}
