use async_trait::async_trait;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::{
    error::Result,
    models::{
        secret::{Secret, SecretMetadata},
        user::User,
    },
    protocol::SecretType,
};

/// The future returned by a unit of transactional work.
pub type TxFuture<'t> = BoxFuture<'t, Result<()>>;

/// A unit of work run by [`MetadataStore::in_transaction`].
pub type TxWork<'a> =
    Box<dyn for<'t> FnOnce(&'t mut dyn MetadataTx) -> TxFuture<'t> + Send + 'a>;

/// Boxes a closure into a [`TxWork`].
///
/// ```ignore
/// store
///     .in_transaction(transaction(move |tx| {
///         Box::pin(async move { tx.remove_secret_by_uuid(uuid).await })
///     }))
///     .await?;
/// ```
pub fn transaction<'a, F>(f: F) -> TxWork<'a>
where
    F: for<'t> FnOnce(&'t mut dyn MetadataTx) -> TxFuture<'t> + Send + 'a,
{
    Box::new(f)
}

/// Secret mutations available inside a transaction.
///
/// Nothing done through a `MetadataTx` is visible to other callers until the
/// surrounding [`MetadataStore::in_transaction`] commits.
#[async_trait]
pub trait MetadataTx: Send {
    async fn add_secret_metadata(
        &mut self,
        owner: Uuid,
        secret_uuid: Uuid,
        name: &str,
        secret_type: SecretType,
    ) -> Result<SecretMetadata>;

    async fn update_secret_metadata_uuid(
        &mut self,
        owner: Uuid,
        old_uuid: Uuid,
        new_uuid: Uuid,
        secret_type: SecretType,
    ) -> Result<()>;

    async fn remove_secret_by_uuid(&mut self, uuid: Uuid) -> Result<()>;

    async fn get_user_secret_by_name(
        &mut self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
    ) -> Result<Secret>;
}

/// Transactional storage of users, secret metadata and plain secret payloads.
///
/// Every lookup miss is `AppError::NotFound`; every uniqueness violation
/// (`login`, `(owner, name, type)`, secret `uuid`) is `AppError::AlreadyExists`.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Runs `work` atomically. An error rolls everything back; success commits.
    async fn in_transaction(&self, work: TxWork<'_>) -> Result<()>;

    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User>;

    async fn get_user_by_login(&self, login: &str) -> Result<User>;

    async fn get_user_by_uuid(&self, uuid: Uuid) -> Result<User>;

    async fn add_secret_metadata(
        &self,
        owner: Uuid,
        secret_uuid: Uuid,
        name: &str,
        secret_type: SecretType,
    ) -> Result<SecretMetadata>;

    /// Creates the metadata record and its payload in one step.
    async fn add_plain_secret(
        &self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
        data: &[u8],
    ) -> Result<SecretMetadata>;

    /// Replaces the payload and bumps `updated_at`. Never creates.
    async fn update_plain_secret_data(
        &self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
        data: &[u8],
    ) -> Result<()>;

    /// Repoints a metadata record to a new identity.
    async fn update_secret_metadata_uuid(
        &self,
        owner: Uuid,
        old_uuid: Uuid,
        new_uuid: Uuid,
        secret_type: SecretType,
    ) -> Result<()>;

    /// Removes the record and any payload attached to it.
    async fn remove_secret_by_uuid(&self, uuid: Uuid) -> Result<()>;

    async fn get_user_secret_by_name(
        &self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
    ) -> Result<Secret>;

    /// Lists metadata for `(owner, type)`, ordered by name.
    async fn get_user_secrets_metadata_by_type(
        &self,
        owner: Uuid,
        secret_type: SecretType,
    ) -> Result<Vec<SecretMetadata>>;
}
