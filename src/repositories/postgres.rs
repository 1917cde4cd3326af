use std::error::Error as StdError;

use async_trait::async_trait;
use bytes::BytesMut;
use deadpool_postgres::{Pool, Transaction};
use postgres_types::{accepts, to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::{error::SqlState, GenericClient, Row};
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

impl ToSql for SecretType {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn StdError + Sync + Send>> {
        i16::from(self.code()).to_sql(ty, out)
    }

    accepts!(INT2);
    to_sql_checked!();
}

impl<'a> FromSql<'a> for SecretType {
    fn from_sql(
        ty: &Type,
        raw: &'a [u8],
    ) -> std::result::Result<Self, Box<dyn StdError + Sync + Send>> {
        let code = u8::try_from(i16::from_sql(ty, raw)?)?;
        Ok(SecretType::try_from(code)?)
    }

    accepts!(INT2);
}

/// Maps a unique-constraint violation to `AlreadyExists`, anything else passes through.
fn map_unique(e: tokio_postgres::Error, what: impl FnOnce() -> String) -> AppError {
    if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        AppError::AlreadyExists(what())
    } else {
        tracing::error!("❌ Metadata query failed: {}", e);
        AppError::Database(e)
    }
}

fn row_to_user(row: &Row) -> Result<User> {
    Ok(User {
        uuid: row.try_get("uuid").map_err(|_| AppError::MissingData("uuid".to_string()))?,
        login: row.try_get("login").map_err(|_| AppError::MissingData("login".to_string()))?,
        password_hash: row.try_get("password_hash").map_err(|_| AppError::MissingData("password_hash".to_string()))?,
    })
}

fn row_to_metadata(row: &Row) -> Result<SecretMetadata> {
    Ok(SecretMetadata {
        uuid: row.try_get("uuid").map_err(|_| AppError::MissingData("uuid".to_string()))?,
        owner_uuid: row.try_get("owner_uuid").map_err(|_| AppError::MissingData("owner_uuid".to_string()))?,
        name: row.try_get("name").map_err(|_| AppError::MissingData("name".to_string()))?,
        secret_type: row.try_get("type").map_err(|_| AppError::MissingData("type".to_string()))?,
        created_at: row.try_get("created_at").map_err(|_| AppError::MissingData("created_at".to_string()))?,
        updated_at: row.try_get("updated_at").map_err(|_| AppError::MissingData("updated_at".to_string()))?,
    })
}

fn row_to_secret(row: &Row) -> Result<Secret> {
    Ok(Secret {
        meta: row_to_metadata(row)?,
        data: row.try_get("data").map_err(|_| AppError::MissingData("data".to_string()))?,
    })
}

fn secret_not_found(name: &str, secret_type: SecretType) -> AppError {
    AppError::NotFound(format!("{} secret {:?} not found", secret_type, name))
}

async fn insert_metadata<C: GenericClient + Sync>(
    client: &C,
    owner: Uuid,
    secret_uuid: Uuid,
    name: &str,
    secret_type: SecretType,
) -> Result<SecretMetadata> {
    let row = client
        .query_one(
            r#"
            INSERT INTO secret_metadata (uuid, owner_uuid, name, type)
            VALUES ($1, $2, $3, $4)
            RETURNING uuid, owner_uuid, name, type, created_at, updated_at
            "#,
            &[&secret_uuid, &owner, &name, &secret_type],
        )
        .await
        .map_err(|e| map_unique(e, || format!("{} secret {:?} already exists", secret_type, name)))?;
    row_to_metadata(&row)
}

async fn repoint_metadata<C: GenericClient + Sync>(
    client: &C,
    owner: Uuid,
    old_uuid: Uuid,
    new_uuid: Uuid,
    secret_type: SecretType,
) -> Result<()> {
    let updated = client
        .execute(
            r#"
            UPDATE secret_metadata
            SET uuid = $3, updated_at = NOW()
            WHERE owner_uuid = $1 AND uuid = $2 AND type = $4
            "#,
            &[&owner, &old_uuid, &new_uuid, &secret_type],
        )
        .await
        .map_err(|e| map_unique(e, || format!("secret {} already exists", new_uuid)))?;

    if updated == 0 {
        return Err(AppError::NotFound(format!("secret {} not found", old_uuid)));
    }
    Ok(())
}

async fn delete_metadata<C: GenericClient + Sync>(client: &C, uuid: Uuid) -> Result<()> {
    let deleted = client
        .execute("DELETE FROM secret_metadata WHERE uuid = $1", &[&uuid])
        .await?;

    if deleted == 0 {
        return Err(AppError::NotFound(format!("secret {} not found", uuid)));
    }
    Ok(())
}

async fn select_secret_by_name<C: GenericClient + Sync>(
    client: &C,
    owner: Uuid,
    name: &str,
    secret_type: SecretType,
) -> Result<Secret> {
    let row = client
        .query_opt(
            r#"
            SELECT m.uuid, m.owner_uuid, m.name, m.type, m.created_at, m.updated_at, p.data
            FROM secret_metadata m
            LEFT JOIN plain_secret p ON p.uuid = m.uuid
            WHERE m.owner_uuid = $1 AND m.name = $2 AND m.type = $3
            "#,
            &[&owner, &name, &secret_type],
        )
        .await?
        .ok_or_else(|| secret_not_found(name, secret_type))?;
    row_to_secret(&row)
}

/// A [`MetadataStore`] backed by PostgreSQL.
///
/// Uniqueness is enforced by the schema: `UNIQUE (owner_uuid, name, type)` on
/// `secret_metadata`, the primary key on `uuid`, and `plain_secret` following
/// identity changes through `ON UPDATE CASCADE`.
pub struct PostgresMetadataStore {
    pool: Pool,
}

impl PostgresMetadataStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

struct PgTx<'a> {
    tx: Transaction<'a>,
}

#[async_trait]
impl MetadataTx for PgTx<'_> {
    async fn add_secret_metadata(
        &mut self,
        owner: Uuid,
        secret_uuid: Uuid,
        name: &str,
        secret_type: SecretType,
    ) -> Result<SecretMetadata> {
        insert_metadata(&*self.tx, owner, secret_uuid, name, secret_type).await
    }

    async fn update_secret_metadata_uuid(
        &mut self,
        owner: Uuid,
        old_uuid: Uuid,
        new_uuid: Uuid,
        secret_type: SecretType,
    ) -> Result<()> {
        repoint_metadata(&*self.tx, owner, old_uuid, new_uuid, secret_type).await
    }

    async fn remove_secret_by_uuid(&mut self, uuid: Uuid) -> Result<()> {
        delete_metadata(&*self.tx, uuid).await
    }

    async fn get_user_secret_by_name(
        &mut self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
    ) -> Result<Secret> {
        select_secret_by_name(&*self.tx, owner, name, secret_type).await
    }
}

#[async_trait]
impl MetadataStore for PostgresMetadataStore {
    async fn in_transaction(&self, work: TxWork<'_>) -> Result<()> {
        let mut client = self.pool.get().await?;
        let mut pg_tx = PgTx {
            tx: client.transaction().await?,
        };

        match work(&mut pg_tx).await {
            Ok(()) => {
                pg_tx.tx.commit().await?;
                Ok(())
            }
            Err(e) => {
                if let Err(rollback) = pg_tx.tx.rollback().await {
                    tracing::error!("❌ Rollback failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User> {
        let client = self.pool.get().await?;
        let row = client
            .query_one(
                r#"
                INSERT INTO users (uuid, login, password_hash)
                VALUES ($1, $2, $3)
                RETURNING uuid, login, password_hash
                "#,
                &[&Uuid::new_v4(), &login, &password_hash],
            )
            .await
            .map_err(|e| map_unique(e, || format!("login {:?} is taken", login)))?;
        row_to_user(&row)
    }

    async fn get_user_by_login(&self, login: &str) -> Result<User> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT uuid, login, password_hash FROM users WHERE login = $1",
                &[&login],
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {:?} not found", login)))?;
        row_to_user(&row)
    }

    async fn get_user_by_uuid(&self, uuid: Uuid) -> Result<User> {
        let client = self.pool.get().await?;
        let row = client
            .query_opt(
                "SELECT uuid, login, password_hash FROM users WHERE uuid = $1",
                &[&uuid],
            )
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {} not found", uuid)))?;
        row_to_user(&row)
    }

    async fn add_secret_metadata(
        &self,
        owner: Uuid,
        secret_uuid: Uuid,
        name: &str,
        secret_type: SecretType,
    ) -> Result<SecretMetadata> {
        let client = self.pool.get().await?;
        insert_metadata(&**client, owner, secret_uuid, name, secret_type).await
    }

    async fn add_plain_secret(
        &self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
        data: &[u8],
    ) -> Result<SecretMetadata> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let meta = insert_metadata(&*tx, owner, Uuid::new_v4(), name, secret_type).await?;
        tx.execute(
            "INSERT INTO plain_secret (uuid, data) VALUES ($1, $2)",
            &[&meta.uuid, &data],
        )
        .await?;

        tx.commit().await?;
        Ok(meta)
    }

    async fn update_plain_secret_data(
        &self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
        data: &[u8],
    ) -> Result<()> {
        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let updated = tx
            .execute(
                r#"
                UPDATE plain_secret p
                SET data = $4
                FROM secret_metadata m
                WHERE p.uuid = m.uuid AND m.owner_uuid = $1 AND m.name = $2 AND m.type = $3
                "#,
                &[&owner, &name, &secret_type, &data],
            )
            .await?;
        if updated == 0 {
            return Err(secret_not_found(name, secret_type));
        }

        tx.execute(
            r#"
            UPDATE secret_metadata
            SET updated_at = NOW()
            WHERE owner_uuid = $1 AND name = $2 AND type = $3
            "#,
            &[&owner, &name, &secret_type],
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn update_secret_metadata_uuid(
        &self,
        owner: Uuid,
        old_uuid: Uuid,
        new_uuid: Uuid,
        secret_type: SecretType,
    ) -> Result<()> {
        let client = self.pool.get().await?;
        repoint_metadata(&**client, owner, old_uuid, new_uuid, secret_type).await
    }

    async fn remove_secret_by_uuid(&self, uuid: Uuid) -> Result<()> {
        let client = self.pool.get().await?;
        delete_metadata(&**client, uuid).await
    }

    async fn get_user_secret_by_name(
        &self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
    ) -> Result<Secret> {
        let client = self.pool.get().await?;
        select_secret_by_name(&**client, owner, name, secret_type).await
    }

    async fn get_user_secrets_metadata_by_type(
        &self,
        owner: Uuid,
        secret_type: SecretType,
    ) -> Result<Vec<SecretMetadata>> {
        let client = self.pool.get().await?;
        let rows = client
            .query(
                r#"
                SELECT uuid, owner_uuid, name, type, created_at, updated_at
                FROM secret_metadata
                WHERE owner_uuid = $1 AND type = $2
                ORDER BY name
                "#,
                &[&owner, &secret_type],
            )
            .await?;
        rows.iter().map(row_to_metadata).collect()
    }
}
