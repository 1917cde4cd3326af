use std::io::ErrorKind;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use futures::{StreamExt, TryStreamExt};
use tokio_util::{
    codec::{FramedRead, LengthDelimitedCodec},
    io::StreamReader,
};

use crate::{
    error::{AppError, Result},
    models::user::User,
    protocol::{UploadFrame, MAX_FRAME_SIZE},
    services::media as media_service,
    state::AppState,
};

/// Receives a client-streamed media upload.
///
/// The body is a sequence of length-delimited frames, each a bincode encoded
/// [`UploadFrame`]. The end of the body closes the stream.
pub async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    body: Body,
) -> Result<impl IntoResponse> {
    let reader = StreamReader::new(body.into_data_stream().map_err(std::io::Error::other));
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_SIZE)
        .new_codec();

    let frames = FramedRead::new(reader, codec).map(|frame| match frame {
        Ok(bytes) => UploadFrame::decode(&bytes)
            .map_err(|e| AppError::InvalidArgument(format!("Malformed upload frame: {}", e))),
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            Err(AppError::InvalidArgument(format!("Malformed upload frame: {}", e)))
        }
        Err(e) => Err(AppError::DataLoss(format!(
            "Error while receiving media data: {}",
            e
        ))),
    });

    let response = media_service::upload(&state, &user, frames).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Streams a media secret back as raw chunks.
pub async fn download(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Path(name): Path<String>,
) -> Result<Response> {
    let stream = media_service::download(&state, &user, &name).await?;
    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(stream),
    )
        .into_response())
}
