//! The logged-in state of a client.
//!
//! Only `{login, password_hash, server_token}` is ever written to disk. The
//! content key is re-derived from the password each time a session starts.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::client::error::{ClientError, Result};
use crate::crypto::{aes::SecretKey, key::derive_key, password::PasswordHasher};

/// File name of the session record inside the work dir.
pub const USERDATA_FILE: &str = "userdata.json";

/// Mixed into the local password hash so it differs from the server's.
const SESSION_PEPPER: &[u8] = b"keeper-session";

#[derive(Serialize, Deserialize)]
struct UserData {
    login: String,
    password_hash: String,
    server_token: String,
}

/// An authenticated session: server token plus the content key.
pub struct Session {
    login: String,
    token: String,
    secret_key: SecretKey,
    password_hash: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("login", &self.login)
            .finish_non_exhaustive()
    }
}

fn userdata_path(work_dir: &Path) -> PathBuf {
    work_dir.join(USERDATA_FILE)
}

async fn hash_password(password: &str) -> Result<String> {
    let password = Zeroizing::new(password.to_string());
    tokio::task::spawn_blocking(move || PasswordHasher::new(SESSION_PEPPER).hash(&password))
        .await
        .map_err(|e| ClientError::Session(format!("Hashing task failed: {}", e)))?
        .map_err(|e| ClientError::Session(e.to_string()))
}

async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let password = Zeroizing::new(password.to_string());
    let hash = hash.to_string();
    tokio::task::spawn_blocking(move || PasswordHasher::new(SESSION_PEPPER).verify(&password, &hash))
        .await
        .map_err(|e| ClientError::Session(format!("Verification task failed: {}", e)))?
        .map_err(|e| ClientError::Session(e.to_string()))
}

impl Session {
    /// Starts a session after a successful register or login.
    pub async fn new(login: &str, password: &str, token: String) -> Result<Self> {
        Ok(Self {
            login: login.to_string(),
            token,
            secret_key: derive_key(login, password),
            password_hash: hash_password(password).await?,
        })
    }

    pub fn login(&self) -> &str {
        &self.login
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret_key
    }

    /// Writes the session record into `work_dir`, replacing any previous one.
    pub async fn save(&self, work_dir: &Path) -> Result<()> {
        let record = UserData {
            login: self.login.clone(),
            password_hash: self.password_hash.clone(),
            server_token: self.token.clone(),
        };
        tokio::fs::create_dir_all(work_dir).await?;
        tokio::fs::write(userdata_path(work_dir), sonic_rs::to_vec(&record)?).await?;

        tracing::debug!(login = %self.login, "Session saved");
        Ok(())
    }

    /// Login stored in the session record, if there is one.
    pub async fn stored_login(work_dir: &Path) -> Result<Option<String>> {
        Ok(read_record(work_dir).await?.map(|record| record.login))
    }

    /// Restores the stored session once the password checks out.
    ///
    /// Returns `None` when there is no stored session. A wrong password drops
    /// the stored record and fails.
    pub async fn resume(work_dir: &Path, password: &str) -> Result<Option<Self>> {
        let Some(record) = read_record(work_dir).await? else {
            return Ok(None);
        };

        if !verify_password(password, &record.password_hash).await? {
            tracing::warn!(login = %record.login, "Incorrect password, session dropped");
            Self::forget(work_dir).await?;
            return Err(ClientError::Session(
                "Incorrect password, session dropped".to_string(),
            ));
        }

        tracing::info!(login = %record.login, "Session resumed");
        Ok(Some(Self {
            secret_key: derive_key(&record.login, password),
            login: record.login,
            token: record.server_token,
            password_hash: record.password_hash,
        }))
    }

    /// Removes the stored session record, if any.
    pub async fn forget(work_dir: &Path) -> Result<()> {
        match tokio::fs::remove_file(userdata_path(work_dir)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

async fn read_record(work_dir: &Path) -> Result<Option<UserData>> {
    let raw = match tokio::fs::read(userdata_path(work_dir)).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if raw.is_empty() {
        return Err(ClientError::Session("Session file is empty".to_string()));
    }

    sonic_rs::from_slice(&raw)
        .map(Some)
        .map_err(|e| ClientError::Session(format!("Cannot parse session file: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saved_session_resumes_with_the_same_key() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new("alice", "pw1", "token-a".to_string()).await.unwrap();
        session.save(dir.path()).await.unwrap();

        let raw = tokio::fs::read_to_string(dir.path().join(USERDATA_FILE)).await.unwrap();
        assert!(!raw.contains("pw1"));
        assert!(raw.contains("$argon2id$"));

        let resumed = Session::resume(dir.path(), "pw1").await.unwrap().unwrap();
        assert_eq!(resumed.login(), "alice");
        assert_eq!(resumed.token(), "token-a");
        assert_eq!(resumed.secret_key(), session.secret_key());
    }

    #[tokio::test]
    async fn wrong_password_drops_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new("alice", "pw1", "token-a".to_string()).await.unwrap();
        session.save(dir.path()).await.unwrap();

        let err = Session::resume(dir.path(), "pw2").await.unwrap_err();
        assert!(matches!(err, ClientError::Session(_)));
        assert!(!dir.path().join(USERDATA_FILE).exists());
        assert!(Session::resume(dir.path(), "pw1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn no_record_means_no_session() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Session::resume(dir.path(), "pw1").await.unwrap().is_none());
        assert!(Session::stored_login(dir.path()).await.unwrap().is_none());
        Session::forget(dir.path()).await.unwrap();
    }
}
