use thiserror::Error;

use crate::crypto::{aes::CryptoError, stream::StreamCryptoError};
use crate::protocol::ErrorCode;

/// Errors surfaced to the operator of the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server answered with an error body.
    #[error("{code}: {message}")]
    Rpc { code: ErrorCode, message: String },

    /// The request never got an answer.
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Local decryption failed: wrong key or corrupted content.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The input does not describe a valid secret.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// The local session record is unusable.
    #[error("Session error: {0}")]
    Session(String),
}

/// A `Result` type that uses `ClientError` as the error type.
pub type Result<T> = std::result::Result<T, ClientError>;

impl ClientError {
    /// The server error code, if the server produced this error.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            ClientError::Rpc { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<StreamCryptoError> for ClientError {
    fn from(e: StreamCryptoError) -> Self {
        match e {
            StreamCryptoError::Crypto(e) => ClientError::Crypto(e),
            StreamCryptoError::Io(e) => ClientError::Io(e),
        }
    }
}

impl From<sonic_rs::Error> for ClientError {
    fn from(e: sonic_rs::Error) -> Self {
        ClientError::Serialization(e.to_string())
    }
}

impl From<bincode::error::EncodeError> for ClientError {
    fn from(e: bincode::error::EncodeError) -> Self {
        ClientError::Serialization(e.to_string())
    }
}
