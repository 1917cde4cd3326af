use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::protocol::{SecretInfo, SecretType};

/// The identity and bookkeeping record of a secret.
///
/// `uuid` joins the record to its content; for media it is also the blob key.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretMetadata {
    pub uuid: Uuid,
    pub owner_uuid: Uuid,
    pub name: String,
    pub secret_type: SecretType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SecretMetadata {
    pub fn new(owner_uuid: Uuid, uuid: Uuid, name: &str, secret_type: SecretType) -> Self {
        let now = Utc::now();
        Self {
            uuid,
            owner_uuid,
            name: name.to_string(),
            secret_type,
            created_at: now,
            updated_at: now,
        }
    }
}

impl From<&SecretMetadata> for SecretInfo {
    fn from(meta: &SecretMetadata) -> Self {
        SecretInfo {
            name: meta.name.clone(),
            secret_type: meta.secret_type,
            created: meta.created_at,
            updated: meta.updated_at,
        }
    }
}

/// A secret as returned by a point lookup.
///
/// `data` is the client-encrypted payload for Credentials, Card and Text; it is
/// `None` for media, whose content lives in the blob store.
#[derive(Debug, Clone, PartialEq)]
pub struct Secret {
    pub meta: SecretMetadata,
    pub data: Option<Vec<u8>>,
}
