use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// A JSON request body parsed with `sonic_rs`.
///
/// Unlike `axum::Json`, a malformed body is rejected through [`AppError`], so
/// the client gets the usual `{"error", "code"}` shape with `invalid_argument`.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| AppError::InvalidArgument(e.body_text()))?;

        sonic_rs::from_slice(&bytes)
            .map(JsonBody)
            .map_err(|e| AppError::InvalidArgument(format!("Invalid JSON body: {}", e)))
    }
}
