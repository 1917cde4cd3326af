use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::{AppError, Result},
    models::{
        secret::{Secret, SecretMetadata},
        user::User,
    },
    protocol::SecretType,
    repositories::metadata::{MetadataStore, MetadataTx, TxWork},
};

#[derive(Clone, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    secrets: HashMap<Uuid, Secret>,
}

fn secret_not_found(name: &str, secret_type: SecretType) -> AppError {
    AppError::NotFound(format!("{} secret {:?} not found", secret_type, name))
}

impl MemoryState {
    fn find_secret(&self, owner: Uuid, name: &str, secret_type: SecretType) -> Option<&Secret> {
        self.secrets.values().find(|s| {
            s.meta.owner_uuid == owner && s.meta.secret_type == secret_type && s.meta.name == name
        })
    }

    fn insert_secret(
        &mut self,
        owner: Uuid,
        secret_uuid: Uuid,
        name: &str,
        secret_type: SecretType,
        data: Option<Vec<u8>>,
    ) -> Result<SecretMetadata> {
        if self.find_secret(owner, name, secret_type).is_some() {
            return Err(AppError::AlreadyExists(format!(
                "{} secret {:?} already exists",
                secret_type, name
            )));
        }
        if self.secrets.contains_key(&secret_uuid) {
            return Err(AppError::AlreadyExists(format!("secret {} already exists", secret_uuid)));
        }

        let meta = SecretMetadata::new(owner, secret_uuid, name, secret_type);
        self.secrets.insert(
            secret_uuid,
            Secret {
                meta: meta.clone(),
                data,
            },
        );
        Ok(meta)
    }

    fn repoint(
        &mut self,
        owner: Uuid,
        old_uuid: Uuid,
        new_uuid: Uuid,
        secret_type: SecretType,
    ) -> Result<()> {
        let matches = self
            .secrets
            .get(&old_uuid)
            .is_some_and(|s| s.meta.owner_uuid == owner && s.meta.secret_type == secret_type);
        if !matches {
            return Err(AppError::NotFound(format!("secret {} not found", old_uuid)));
        }
        if self.secrets.contains_key(&new_uuid) {
            return Err(AppError::AlreadyExists(format!("secret {} already exists", new_uuid)));
        }

        if let Some(mut secret) = self.secrets.remove(&old_uuid) {
            secret.meta.uuid = new_uuid;
            secret.meta.updated_at = Utc::now();
            self.secrets.insert(new_uuid, secret);
        }
        Ok(())
    }

    fn remove(&mut self, uuid: Uuid) -> Result<()> {
        self.secrets
            .remove(&uuid)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("secret {} not found", uuid)))
    }

    fn get_by_name(&self, owner: Uuid, name: &str, secret_type: SecretType) -> Result<Secret> {
        self.find_secret(owner, name, secret_type)
            .cloned()
            .ok_or_else(|| secret_not_found(name, secret_type))
    }
}

/// A [`MetadataStore`] kept entirely in process memory.
///
/// One mutex guards all state, so every operation, transactions included, is
/// serialized. A transaction works on a scratch copy that replaces the live
/// state only when the work succeeds.
#[derive(Default)]
pub struct MemoryMetadataStore {
    state: Mutex<MemoryState>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryTx<'a> {
    state: &'a mut MemoryState,
}

#[async_trait]
impl MetadataTx for MemoryTx<'_> {
    async fn add_secret_metadata(
        &mut self,
        owner: Uuid,
        secret_uuid: Uuid,
        name: &str,
        secret_type: SecretType,
    ) -> Result<SecretMetadata> {
        self.state.insert_secret(owner, secret_uuid, name, secret_type, None)
    }

    async fn update_secret_metadata_uuid(
        &mut self,
        owner: Uuid,
        old_uuid: Uuid,
        new_uuid: Uuid,
        secret_type: SecretType,
    ) -> Result<()> {
        self.state.repoint(owner, old_uuid, new_uuid, secret_type)
    }

    async fn remove_secret_by_uuid(&mut self, uuid: Uuid) -> Result<()> {
        self.state.remove(uuid)
    }

    async fn get_user_secret_by_name(
        &mut self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
    ) -> Result<Secret> {
        self.state.get_by_name(owner, name, secret_type)
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn in_transaction(&self, work: TxWork<'_>) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut scratch = state.clone();

        let mut tx = MemoryTx {
            state: &mut scratch,
        };
        work(&mut tx).await?;

        *state = scratch;
        Ok(())
    }

    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User> {
        let mut state = self.state.lock().await;
        if state.users.values().any(|u| u.login == login) {
            return Err(AppError::AlreadyExists(format!("login {:?} is taken", login)));
        }

        let user = User {
            uuid: Uuid::new_v4(),
            login: login.to_string(),
            password_hash: password_hash.to_string(),
        };
        state.users.insert(user.uuid, user.clone());
        Ok(user)
    }

    async fn get_user_by_login(&self, login: &str) -> Result<User> {
        let state = self.state.lock().await;
        state
            .users
            .values()
            .find(|u| u.login == login)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("user {:?} not found", login)))
    }

    async fn get_user_by_uuid(&self, uuid: Uuid) -> Result<User> {
        let state = self.state.lock().await;
        state
            .users
            .get(&uuid)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("user {} not found", uuid)))
    }

    async fn add_secret_metadata(
        &self,
        owner: Uuid,
        secret_uuid: Uuid,
        name: &str,
        secret_type: SecretType,
    ) -> Result<SecretMetadata> {
        let mut state = self.state.lock().await;
        state.insert_secret(owner, secret_uuid, name, secret_type, None)
    }

    async fn add_plain_secret(
        &self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
        data: &[u8],
    ) -> Result<SecretMetadata> {
        let mut state = self.state.lock().await;
        state.insert_secret(owner, Uuid::new_v4(), name, secret_type, Some(data.to_vec()))
    }

    async fn update_plain_secret_data(
        &self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
        data: &[u8],
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let secret = state
            .secrets
            .values_mut()
            .find(|s| {
                s.meta.owner_uuid == owner
                    && s.meta.secret_type == secret_type
                    && s.meta.name == name
                    && s.data.is_some()
            })
            .ok_or_else(|| secret_not_found(name, secret_type))?;

        secret.data = Some(data.to_vec());
        secret.meta.updated_at = Utc::now();
        Ok(())
    }

    async fn update_secret_metadata_uuid(
        &self,
        owner: Uuid,
        old_uuid: Uuid,
        new_uuid: Uuid,
        secret_type: SecretType,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.repoint(owner, old_uuid, new_uuid, secret_type)
    }

    async fn remove_secret_by_uuid(&self, uuid: Uuid) -> Result<()> {
        let mut state = self.state.lock().await;
        state.remove(uuid)
    }

    async fn get_user_secret_by_name(
        &self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
    ) -> Result<Secret> {
        let state = self.state.lock().await;
        state.get_by_name(owner, name, secret_type)
    }

    async fn get_user_secrets_metadata_by_type(
        &self,
        owner: Uuid,
        secret_type: SecretType,
    ) -> Result<Vec<SecretMetadata>> {
        let state = self.state.lock().await;
        let mut list: Vec<SecretMetadata> = state
            .secrets
            .values()
            .filter(|s| s.meta.owner_uuid == owner && s.meta.secret_type == secret_type)
            .map(|s| s.meta.clone())
            .collect();
        list.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(list)
    }
}
