use std::env;
use std::path::PathBuf;

/// Name of the directory under the work dir that holds decrypted media.
pub const MEDIA_DIR: &str = "media";

/// Client settings.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Base URL of the keeper server.
    pub server_url: String,
    /// Where the session record and local media live.
    pub work_dir: PathBuf,
}

impl ClientConfig {
    /// Reads `KEEPER_SERVER_URL` and `KEEPER_WORK_DIR`, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            server_url: env::var("KEEPER_SERVER_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string()),
            work_dir: PathBuf::from(
                env::var("KEEPER_WORK_DIR").unwrap_or_else(|_| "keeperData".to_string()),
            ),
        }
    }

    pub fn media_dir(&self) -> PathBuf {
        self.work_dir.join(MEDIA_DIR)
    }
}
