//! Request and response shapes shared by the server and the client.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames larger than this are rejected by the upload decoder.
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Size of the raw chunks moved over the wire in both directions.
pub const TRANSFER_CHUNK_SIZE: usize = 1024 * 1024;

/// The kind of a secret. The numeric codes are stable across the API and storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SecretType {
    Credentials = 0,
    Card = 1,
    Text = 2,
    Media = 3,
}

impl SecretType {
    pub const ALL: [SecretType; 4] = [
        SecretType::Credentials,
        SecretType::Card,
        SecretType::Text,
        SecretType::Media,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            SecretType::Credentials => "credentials",
            SecretType::Card => "card",
            SecretType::Text => "text",
            SecretType::Media => "media",
        }
    }
}

impl TryFrom<u8> for SecretType {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(SecretType::Credentials),
            1 => Ok(SecretType::Card),
            2 => Ok(SecretType::Text),
            3 => Ok(SecretType::Media),
            other => Err(format!("unknown secret type {}", other)),
        }
    }
}

impl From<SecretType> for u8 {
    fn from(kind: SecretType) -> Self {
        kind.code()
    }
}

/// Accepts either the numeric code or the lower-case name.
impl FromStr for SecretType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Ok(code) = s.parse::<u8>() {
            return SecretType::try_from(code);
        }
        SecretType::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown secret type {:?}", s))
    }
}

impl fmt::Display for SecretType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Error codes carried in the `code` field of every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NotFound,
    AlreadyExists,
    InvalidArgument,
    Unauthenticated,
    Internal,
    DataLoss,
    DeadlineExceeded,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotFound => "not_found",
            ErrorCode::AlreadyExists => "already_exists",
            ErrorCode::InvalidArgument => "invalid_argument",
            ErrorCode::Unauthenticated => "unauthenticated",
            ErrorCode::Internal => "internal",
            ErrorCode::DataLoss => "data_loss",
            ErrorCode::DeadlineExceeded => "deadline_exceeded",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: ErrorCode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PingResponse {
    pub answer: String,
}

/// Register and login payload.
#[derive(Serialize, Deserialize)]
pub struct AuthRequest {
    pub login: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SecretSetRequest {
    pub name: String,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SecretUpdateRequest {
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
}

/// One row of a listing. Never carries content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretInfo {
    pub name: String,
    pub secret_type: SecretType,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SecretListResponse {
    pub secrets: Vec<SecretInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SecretResponse {
    pub name: String,
    pub secret_type: SecretType,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MediaUploadResponse {
    pub uuid: Uuid,
    pub name: String,
}

/// One frame of the media upload body.
///
/// The first frame must be `Metadata`; every following frame must be a
/// non-empty `Chunk`.
#[derive(Debug, Clone, PartialEq, bincode::Encode, bincode::Decode)]
pub enum UploadFrame {
    Metadata { name: String, overwrite: bool },
    Chunk(Vec<u8>),
}

impl UploadFrame {
    pub fn encode(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        bincode::encode_to_vec(self, bincode::config::standard())
    }

    /// Decodes exactly one frame. Length prefixes inside the frame may not
    /// claim more than [`MAX_FRAME_SIZE`] bytes, and nothing may follow it.
    pub fn decode(bytes: &[u8]) -> Result<Self, bincode::error::DecodeError> {
        let config = bincode::config::standard().with_limit::<MAX_FRAME_SIZE>();
        let (frame, consumed) = bincode::decode_from_slice(bytes, config)?;
        if consumed != bytes.len() {
            return Err(bincode::error::DecodeError::Other(
                "trailing bytes after upload frame",
            ));
        }
        Ok(frame)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
