use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::crypto::aes::CryptoError;
use crate::protocol::ErrorCode;

/// The application's error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// A database error.
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// A connection pool error.
    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    /// An I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An object storage error.
    #[error("Object storage error: {0}")]
    ObjectStore(#[from] object_store::Error),

    /// A cryptographic error.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A column could not be read from a row.
    #[error("Missing data: {0}")]
    MissingData(String),

    /// A user, secret or blob does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A uniqueness constraint was violated.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// A malformed request or protocol frame.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Missing, invalid or expired credentials.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// An internal server error.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Content was lost mid-transfer.
    #[error("Data loss: {0}")]
    DataLoss(String),

    /// A storage call exceeded its deadline.
    #[error("Deadline exceeded: {0}")]
    DeadlineExceeded(String),
}

/// A `Result` type that uses `AppError` as the error type.
pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    /// The wire code of this error. Backend errors collapse to `internal`.
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::NotFound(_) => ErrorCode::NotFound,
            AppError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            AppError::InvalidArgument(_) => ErrorCode::InvalidArgument,
            AppError::Unauthenticated(_) => ErrorCode::Unauthenticated,
            AppError::DataLoss(_) => ErrorCode::DataLoss,
            AppError::DeadlineExceeded(_) => ErrorCode::DeadlineExceeded,
            _ => ErrorCode::Internal,
        }
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        AppError::DeadlineExceeded("Storage call timed out".to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Pool(ref e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::Io(ref e) => {
                tracing::error!("IO error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }

            AppError::ObjectStore(ref e) => {
                tracing::error!("Object storage error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Storage error".to_string())
            }

            AppError::Crypto(ref e) => {
                tracing::error!("Crypto error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::MissingData(ref column) => {
                tracing::error!("Missing column in row: {}", column);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }

            AppError::NotFound(ref msg) => {
                tracing::debug!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, msg.clone())
            }

            AppError::AlreadyExists(ref msg) => {
                tracing::debug!("Already exists: {}", msg);
                (StatusCode::CONFLICT, msg.clone())
            }

            AppError::InvalidArgument(ref msg) => {
                tracing::debug!("Invalid argument: {}", msg);
                (StatusCode::BAD_REQUEST, msg.clone())
            }

            AppError::Unauthenticated(ref msg) => {
                tracing::warn!("Unauthenticated: {}", msg);
                (StatusCode::UNAUTHORIZED, msg.clone())
            }

            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }

            AppError::DataLoss(ref msg) => {
                tracing::error!("Data loss: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Data loss".to_string())
            }

            AppError::DeadlineExceeded(ref msg) => {
                tracing::warn!("Deadline exceeded: {}", msg);
                (StatusCode::GATEWAY_TIMEOUT, msg.clone())
            }
        };

        let body = sonic_rs::to_string(&sonic_rs::json!({
            "error": message,
            "code": self.code().as_str(),
        }))
        .unwrap_or_else(|_| r#"{"error":"Internal server error","code":"internal"}"#.to_string());

        (
            status,
            [(http::header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_are_masked() {
        let err = AppError::Io(std::io::Error::other("disk on fire at /var/secret"));
        assert_eq!(err.code(), ErrorCode::Internal);
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn taxonomy_maps_to_status() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::AlreadyExists("x".into()), StatusCode::CONFLICT),
            (AppError::InvalidArgument("x".into()), StatusCode::BAD_REQUEST),
            (AppError::Unauthenticated("x".into()), StatusCode::UNAUTHORIZED),
            (AppError::DataLoss("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (AppError::DeadlineExceeded("x".into()), StatusCode::GATEWAY_TIMEOUT),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
