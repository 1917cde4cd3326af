use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use zeroize::Zeroizing;

/// Where media blobs are kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobBackend {
    /// Files under `BLOB_DIR`.
    Local,
    /// An S3-compatible bucket.
    S3,
}

/// Connection settings for the S3 blob backend.
#[derive(Clone)]
pub struct S3Config {
    /// Custom endpoint (MinIO and friends); `None` means AWS.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key_id: Zeroizing<String>,
    pub secret_access_key: Zeroizing<String>,
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The address the server listens on.
    pub listen_addr: SocketAddr,
    /// The HS256 secret used to sign bearer tokens.
    pub token_secret: Zeroizing<Vec<u8>>,
    /// The server-wide salt mixed into password hashes.
    pub password_salt: Zeroizing<Vec<u8>>,
    /// The lifetime of a bearer token in days.
    pub token_ttl_days: i64,
    /// The URL of the PostgreSQL database; `None` keeps metadata in memory.
    pub database_url: Option<String>,
    /// The blob backend.
    pub blob_backend: BlobBackend,
    /// The directory used by the local blob backend.
    pub blob_dir: PathBuf,
    /// S3 settings, present when `blob_backend` is `S3`.
    pub s3: Option<S3Config>,
    /// Upper bound on each storage call and on the wait for each upload frame.
    pub storage_timeout: Duration,
    /// Whether register and login are rate limited per peer address.
    pub rate_limit: bool,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn required_secret(name: &str) -> Result<Zeroizing<Vec<u8>>> {
    let value = Zeroizing::new(env::var(name).with_context(|| format!("{} must be set", name))?);
    if value.is_empty() {
        anyhow::bail!("{} must not be empty", name);
    }
    Ok(Zeroizing::new(value.as_bytes().to_vec()))
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let blob_backend = match var_or("BLOB_BACKEND", "local").to_ascii_lowercase().as_str() {
            "local" => BlobBackend::Local,
            "s3" => BlobBackend::S3,
            other => anyhow::bail!("BLOB_BACKEND must be 'local' or 's3', got '{}'", other),
        };

        let s3 = if blob_backend == BlobBackend::S3 {
            Some(S3Config {
                endpoint: env::var("S3_ENDPOINT").ok(),
                region: var_or("S3_REGION", "us-east-1"),
                bucket: var_or("S3_BUCKET", "keeper"),
                access_key_id: Zeroizing::new(
                    env::var("S3_ACCESS_KEY_ID").context("S3_ACCESS_KEY_ID must be set")?,
                ),
                secret_access_key: Zeroizing::new(
                    env::var("S3_SECRET_ACCESS_KEY").context("S3_SECRET_ACCESS_KEY must be set")?,
                ),
            })
        } else {
            None
        };

        Ok(Self {
            listen_addr: var_or("LISTEN_ADDR", "127.0.0.1:3000")
                .parse()
                .context("Invalid LISTEN_ADDR")?,
            token_secret: required_secret("SECRET_TOKEN")?,
            password_salt: required_secret("PASSWORD_SALT")?,
            token_ttl_days: var_or("TOKEN_TTL_DAYS", "30")
                .parse()
                .context("Invalid TOKEN_TTL_DAYS")?,
            database_url: env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
            blob_backend,
            blob_dir: PathBuf::from(var_or("BLOB_DIR", "data/blobs")),
            s3,
            storage_timeout: Duration::from_secs(
                var_or("STORAGE_TIMEOUT_SECS", "30")
                    .parse()
                    .context("Invalid STORAGE_TIMEOUT_SECS")?,
            ),
            rate_limit: var_or("RATE_LIMIT", "true")
                .parse()
                .context("RATE_LIMIT must be 'true' or 'false'")?,
        })
    }

    /// A configuration for tests: in-memory metadata, local blobs under
    /// `blob_dir`, no rate limiting.
    pub fn for_tests(blob_dir: PathBuf) -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            token_secret: Zeroizing::new(b"test-token-secret".to_vec()),
            password_salt: Zeroizing::new(b"test-password-salt".to_vec()),
            token_ttl_days: 30,
            database_url: None,
            blob_backend: BlobBackend::Local,
            blob_dir,
            s3: None,
            storage_timeout: Duration::from_secs(5),
            rate_limit: false,
        }
    }
}
