use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::{BlobBackend, Config};
use crate::crypto::{password::PasswordHasher, token::TokenIssuer};
use crate::error::{AppError, Result};
use crate::repositories::{
    memory::MemoryMetadataStore, metadata::MetadataStore, postgres::PostgresMetadataStore,
};
use crate::storage::{blob::BlobStore, local::LocalBlobStore, object::ObjectBlobStore};

/// The number of media uploads processed at once.
pub const UPLOAD_SLOTS: usize = 64;
/// The number of media downloads streamed at once.
pub const DOWNLOAD_SLOTS: usize = 64;

/// Bounds the number of concurrent media transfers in one direction.
#[derive(Clone)]
pub struct TransferLimiter {
    semaphore: Arc<Semaphore>,
}

impl TransferLimiter {
    /// Creates a new `TransferLimiter`.
    pub fn new(slots: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(slots)),
        }
    }

    /// Waits for a free slot. The slot is released when the permit is dropped.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit> {
        self.semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| AppError::Internal(format!("Transfer limiter closed: {}", e)))
    }

    /// Returns the number of available permits.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// The application's state.
#[derive(Clone)]
pub struct AppState {
    /// Users, secret metadata and plain secret payloads.
    pub metadata: Arc<dyn MetadataStore>,
    /// Media content.
    pub blobs: Arc<dyn BlobStore>,
    /// Password hashing bound to the configured server salt.
    pub passwords: PasswordHasher,
    /// Bearer token minting and validation.
    pub tokens: TokenIssuer,
    /// The application's configuration.
    pub config: Config,
    /// The upload limiter.
    pub upload_limiter: TransferLimiter,
    /// The download limiter.
    pub download_limiter: TransferLimiter,
}

impl AppState {
    /// Creates a new `AppState`, choosing the backends named by the configuration.
    ///
    /// # Arguments
    ///
    /// * `config` - The application's configuration.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `AppState`.
    pub async fn new(config: &Config) -> Result<Self> {
        let metadata: Arc<dyn MetadataStore> = match &config.database_url {
            Some(url) => {
                let pool = crate::db::create_pool(url)?;
                crate::db::run_migrations(&pool).await?;
                tracing::info!("✅ PostgreSQL metadata store initialized");
                Arc::new(PostgresMetadataStore::new(pool))
            }
            None => {
                tracing::warn!("⚠️ DATABASE_URL not set, metadata is kept in memory");
                Arc::new(MemoryMetadataStore::new())
            }
        };

        let blobs: Arc<dyn BlobStore> = match config.blob_backend {
            BlobBackend::Local => Arc::new(LocalBlobStore::new(config.blob_dir.clone()).await?),
            BlobBackend::S3 => {
                let s3 = config
                    .s3
                    .as_ref()
                    .ok_or_else(|| AppError::Internal("S3 settings missing".to_string()))?;
                Arc::new(ObjectBlobStore::from_s3(s3)?)
            }
        };
        tracing::info!("✅ Blob store initialized ({:?})", config.blob_backend);

        Ok(Self::with_stores(config, metadata, blobs))
    }

    /// Runs a storage call under the configured deadline.
    ///
    /// Exceeding it yields `AppError::DeadlineExceeded`.
    pub async fn bounded<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        tokio::time::timeout(self.config.storage_timeout, call).await?
    }

    /// Assembles the state around already constructed stores.
    pub fn with_stores(
        config: &Config,
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        AppState {
            metadata,
            blobs,
            passwords: PasswordHasher::new(&config.password_salt),
            tokens: TokenIssuer::new(&config.token_secret, config.token_ttl_days),
            config: config.clone(),
            upload_limiter: TransferLimiter::new(UPLOAD_SLOTS),
            download_limiter: TransferLimiter::new(DOWNLOAD_SLOTS),
        }
    }
}
