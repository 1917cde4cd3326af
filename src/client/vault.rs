//! Client side of the vault: structured secrets in, sealed bytes out.
//!
//! Every payload is encrypted with the session key before it reaches the
//! connector, and decrypted after it comes back. Media is sealed block by
//! block into a temporary file which is then streamed in transfer chunks.

use std::io::{ErrorKind, SeekFrom};
use std::path::{Path, PathBuf};

use futures::TryStreamExt;
use garde::Validate;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tokio_util::io::ReaderStream;

use crate::client::{
    config::ClientConfig,
    connector::Connector,
    error::{ClientError, Result},
    session::Session,
};
use crate::crypto::{aes, stream as block_stream};
use crate::protocol::{SecretInfo, SecretType, TRANSFER_CHUNK_SIZE};

/// A login/password pair kept for some other service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

fn card_number(number: &str, _ctx: &()) -> garde::Result {
    let digits: String = number.chars().filter(|c| !c.is_whitespace()).collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(garde::Error::new("must contain only digits and spaces"));
    }
    if !(12..=19).contains(&digits.len()) {
        return Err(garde::Error::new("must have between 12 and 19 digits"));
    }
    Ok(())
}

fn card_holder(holder: &str, _ctx: &()) -> garde::Result {
    if holder.split_whitespace().count() != 2 {
        return Err(garde::Error::new("must have a first and a last name"));
    }
    Ok(())
}

/// A payment card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Card {
    #[garde(custom(card_number))]
    pub number: String,
    #[serde(rename = "card_holder")]
    #[garde(custom(card_holder))]
    pub holder: String,
    #[garde(range(min = 10, max = 999))]
    pub cvv: u16,
    #[serde(rename = "expires")]
    #[garde(skip)]
    pub expiry: String,
}

#[derive(Serialize, Deserialize)]
struct TextNote {
    text: String,
}

/// A secret as the operator sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretEntry {
    Credentials(Credentials),
    Card(Card),
    Text(String),
    /// A file. On upload it is the source path; on download, where the
    /// decrypted content was written.
    Media(PathBuf),
}

impl SecretEntry {
    pub fn secret_type(&self) -> SecretType {
        match self {
            SecretEntry::Credentials(_) => SecretType::Credentials,
            SecretEntry::Card(_) => SecretType::Card,
            SecretEntry::Text(_) => SecretType::Text,
            SecretEntry::Media(_) => SecretType::Media,
        }
    }
}

/// One row of a listing.
#[derive(Debug, Clone)]
pub struct ListedSecret {
    pub info: SecretInfo,
    /// For media: whether a decrypted copy sits in the local media directory.
    pub local: bool,
}

/// An authenticated vault.
pub struct Vault {
    connector: Connector,
    session: Session,
    work_dir: PathBuf,
    media_dir: PathBuf,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("session", &self.session)
            .field("work_dir", &self.work_dir)
            .field("media_dir", &self.media_dir)
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Creates an account and opens its vault.
    pub async fn register(config: &ClientConfig, login: &str, password: &str) -> Result<Self> {
        let connector = Connector::new(&config.server_url)?;
        let token = connector.register(login, password).await?;
        tracing::info!(login = %login, "Registered");
        Self::start(config, connector, Session::new(login, password, token).await?).await
    }

    /// Logs in and opens the vault.
    pub async fn login(config: &ClientConfig, login: &str, password: &str) -> Result<Self> {
        let connector = Connector::new(&config.server_url)?;
        let token = connector.login(login, password).await?;
        tracing::info!(login = %login, "Logged in");
        Self::start(config, connector, Session::new(login, password, token).await?).await
    }

    /// Reopens the vault of the stored session. `None` if nothing is stored.
    pub async fn resume(config: &ClientConfig, password: &str) -> Result<Option<Self>> {
        let Some(session) = Session::resume(&config.work_dir, password).await? else {
            return Ok(None);
        };
        let connector = Connector::new(&config.server_url)?.with_token(session.token());
        tokio::fs::create_dir_all(config.media_dir()).await?;

        Ok(Some(Self {
            connector,
            session,
            work_dir: config.work_dir.clone(),
            media_dir: config.media_dir(),
        }))
    }

    async fn start(config: &ClientConfig, connector: Connector, session: Session) -> Result<Self> {
        session.save(&config.work_dir).await?;
        tokio::fs::create_dir_all(config.media_dir()).await?;

        Ok(Self {
            connector: connector.with_token(session.token()),
            session,
            work_dir: config.work_dir.clone(),
            media_dir: config.media_dir(),
        })
    }

    /// Ends the session and drops the stored record.
    pub async fn logout(self) -> Result<()> {
        Session::forget(&self.work_dir).await?;
        tracing::info!(login = %self.session.login(), "Logged out");
        Ok(())
    }

    pub fn login_name(&self) -> &str {
        self.session.login()
    }

    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    pub async fn ping(&self) -> Result<String> {
        self.connector.ping().await
    }

    pub async fn list(&self, secret_type: SecretType) -> Result<Vec<ListedSecret>> {
        let secrets = self.connector.list_secrets(secret_type).await?;
        let mut listed = Vec::with_capacity(secrets.len());
        for info in secrets {
            let local = secret_type == SecretType::Media && self.is_media_local(&info.name).await;
            listed.push(ListedSecret { info, local });
        }
        Ok(listed)
    }

    /// Stores a new secret under `name`.
    pub async fn set(&self, name: &str, entry: &SecretEntry) -> Result<()> {
        match entry {
            SecretEntry::Media(path) => self.upload_media(name, path, false).await,
            _ => {
                let sealed = self.seal(entry)?;
                self.connector
                    .set_secret(entry.secret_type(), name, &sealed)
                    .await
            }
        }
    }

    /// Replaces the content of an existing secret.
    pub async fn update(&self, name: &str, entry: &SecretEntry) -> Result<()> {
        match entry {
            SecretEntry::Media(path) => self.upload_media(name, path, true).await,
            _ => {
                let sealed = self.seal(entry)?;
                self.connector
                    .update_secret(entry.secret_type(), name, &sealed)
                    .await
            }
        }
    }

    /// Fetches and decrypts a secret. Media is written into the media directory.
    pub async fn get(&self, secret_type: SecretType, name: &str) -> Result<SecretEntry> {
        Ok(match secret_type {
            SecretType::Credentials => SecretEntry::Credentials(self.open(secret_type, name).await?),
            SecretType::Card => SecretEntry::Card(self.open(secret_type, name).await?),
            SecretType::Text => SecretEntry::Text(self.open::<TextNote>(secret_type, name).await?.text),
            SecretType::Media => SecretEntry::Media(self.download_media(name).await?),
        })
    }

    pub async fn delete(&self, secret_type: SecretType, name: &str) -> Result<()> {
        self.connector.delete_secret(secret_type, name).await?;

        if secret_type == SecretType::Media {
            let local = self.local_media_path(name)?;
            match tokio::fs::remove_file(&local).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::error!(name = %name, error = %e, "Cannot remove file from local storage")
                }
            }
        }
        Ok(())
    }

    /// A decrypt failure surfaces as `ClientError::Crypto`.
    async fn open<T: DeserializeOwned>(&self, secret_type: SecretType, name: &str) -> Result<T> {
        let secret = self.connector.get_secret(secret_type, name).await?;
        let plain = aes::decrypt(&secret.content, self.session.secret_key())?;
        parse(&plain)
    }

    fn seal(&self, entry: &SecretEntry) -> Result<Vec<u8>> {
        let plain = match entry {
            SecretEntry::Credentials(credentials) => sonic_rs::to_vec(credentials)?,
            SecretEntry::Card(card) => {
                card.validate()
                    .map_err(|report| ClientError::Validation(report.to_string().trim().to_string()))?;
                sonic_rs::to_vec(card)?
            }
            SecretEntry::Text(text) => sonic_rs::to_vec(&TextNote { text: text.clone() })?,
            SecretEntry::Media(_) => {
                return Err(ClientError::Validation(
                    "Media is sent as a stream".to_string(),
                ))
            }
        };
        Ok(aes::encrypt(&plain, self.session.secret_key())?)
    }

    /// Local copies are flat files named after the secret.
    fn local_media_path(&self, name: &str) -> Result<PathBuf> {
        match Path::new(name).file_name() {
            Some(file_name) if file_name == name => Ok(self.media_dir.join(name)),
            _ => Err(ClientError::Validation(format!(
                "Media name {:?} cannot be used as a file name",
                name
            ))),
        }
    }

    async fn is_media_local(&self, name: &str) -> bool {
        match self.local_media_path(name) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn upload_media(&self, name: &str, source: &Path, overwrite: bool) -> Result<()> {
        let local = self.local_media_path(name)?;

        let mut plain = tokio::fs::File::open(source).await?;
        let mut sealed = tokio::fs::File::from_std(tempfile::tempfile()?);
        let size =
            block_stream::encrypt_stream(&mut plain, &mut sealed, self.session.secret_key()).await?;
        sealed.seek(SeekFrom::Start(0)).await?;

        let chunks = ReaderStream::with_capacity(sealed, TRANSFER_CHUNK_SIZE);
        let stored = self.connector.upload_media(name, overwrite, chunks).await?;
        tracing::info!(name = %name, uuid = %stored.uuid, size, "Media saved");

        if !same_file(source, &local).await {
            if let Err(e) = tokio::fs::copy(source, &local).await {
                tracing::error!(name = %name, error = %e, "Cannot copy file to media dir");
            }
        }
        Ok(())
    }

    async fn download_media(&self, name: &str) -> Result<PathBuf> {
        let local = self.local_media_path(name)?;

        let mut chunks = self.connector.download_media(name).await?;
        let mut sealed = tokio::fs::File::from_std(tempfile::tempfile()?);
        while let Some(chunk) = chunks.try_next().await? {
            sealed.write_all(&chunk).await?;
        }
        sealed.flush().await?;
        sealed.seek(SeekFrom::Start(0)).await?;

        let staging = tempfile::NamedTempFile::new_in(&self.media_dir)?;
        let mut plain = tokio::fs::File::from_std(staging.reopen()?);
        let size =
            block_stream::decrypt_stream(&mut sealed, &mut plain, self.session.secret_key()).await?;
        plain.sync_all().await?;
        drop(plain);
        staging.persist(&local).map_err(|e| ClientError::Io(e.error))?;

        tracing::info!(name = %name, size, "Media downloaded");
        Ok(local)
    }
}

fn parse<T: DeserializeOwned>(plain: &[u8]) -> Result<T> {
    sonic_rs::from_slice(plain).map_err(|e| ClientError::Serialization(e.to_string()))
}

async fn same_file(a: &Path, b: &Path) -> bool {
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
