//! HTTP binding of the keeper API.
//!
//! One method per server call. Content passes through untouched: everything
//! handed to this layer is already sealed by the vault.

use bytes::{Bytes, BytesMut};
use futures::{
    stream::{self, BoxStream},
    Stream, StreamExt, TryStreamExt,
};
use reqwest::{header, Method, RequestBuilder, Response, StatusCode, Url};
use serde::{de::DeserializeOwned, Serialize};
use tokio_util::codec::{Encoder, LengthDelimitedCodec};

use crate::client::error::{ClientError, Result};
use crate::protocol::{
    AuthRequest, ErrorBody, ErrorCode, MediaUploadResponse, PingResponse, SecretInfo,
    SecretListResponse, SecretResponse, SecretSetRequest, SecretType, SecretUpdateRequest,
    TokenResponse, UploadFrame, MAX_FRAME_SIZE,
};

/// Client for a keeper server.
#[derive(Clone)]
pub struct Connector {
    base_url: Url,
    client: reqwest::Client,
    token: Option<String>,
}

impl Connector {
    /// Builds a connector for the server at `base_url`.
    pub fn new(base_url: &str) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| ClientError::Validation(format!("Invalid server URL {:?}: {}", base_url, e)))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("keeper/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            base_url: parsed,
            client,
            token: None,
        })
    }

    /// Attaches a bearer token sent with every following call.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Validation(format!("{} cannot be a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    pub async fn ping(&self) -> Result<String> {
        let url = self.url(&["api", "ping"])?;
        let response = ensure_success(self.request(Method::GET, url).send().await?).await?;
        let pong: PingResponse = read_json(response).await?;
        Ok(pong.answer)
    }

    /// Creates an account and returns its token.
    pub async fn register(&self, login: &str, password: &str) -> Result<String> {
        self.authenticate(&["api", "auth", "register"], login, password)
            .await
    }

    /// Exchanges a login/password pair for a token.
    pub async fn login(&self, login: &str, password: &str) -> Result<String> {
        self.authenticate(&["api", "auth", "login"], login, password)
            .await
    }

    async fn authenticate(&self, path: &[&str], login: &str, password: &str) -> Result<String> {
        let url = self.url(path)?;
        let body = AuthRequest {
            login: login.to_string(),
            password: password.to_string(),
        };
        let request = with_json(self.request(Method::POST, url), &body)?;
        let response = ensure_success(request.send().await?).await?;
        let token: TokenResponse = read_json(response).await?;
        Ok(token.token)
    }

    pub async fn list_secrets(&self, secret_type: SecretType) -> Result<Vec<SecretInfo>> {
        let code = secret_type.code().to_string();
        let url = self.url(&["api", "secrets", &code])?;
        let response = ensure_success(self.request(Method::GET, url).send().await?).await?;
        let list: SecretListResponse = read_json(response).await?;
        Ok(list.secrets)
    }

    pub async fn set_secret(&self, secret_type: SecretType, name: &str, content: &[u8]) -> Result<()> {
        let code = secret_type.code().to_string();
        let url = self.url(&["api", "secrets", &code])?;
        let body = SecretSetRequest {
            name: name.to_string(),
            content: content.to_vec(),
        };
        let request = with_json(self.request(Method::POST, url), &body)?;
        ensure_success(request.send().await?).await?;
        Ok(())
    }

    pub async fn get_secret(&self, secret_type: SecretType, name: &str) -> Result<SecretResponse> {
        let code = secret_type.code().to_string();
        let url = self.url(&["api", "secrets", &code, name])?;
        let response = ensure_success(self.request(Method::GET, url).send().await?).await?;
        read_json(response).await
    }

    pub async fn update_secret(&self, secret_type: SecretType, name: &str, content: &[u8]) -> Result<()> {
        let code = secret_type.code().to_string();
        let url = self.url(&["api", "secrets", &code, name])?;
        let body = SecretUpdateRequest {
            content: content.to_vec(),
        };
        let request = with_json(self.request(Method::PUT, url), &body)?;
        ensure_success(request.send().await?).await?;
        Ok(())
    }

    pub async fn delete_secret(&self, secret_type: SecretType, name: &str) -> Result<()> {
        let code = secret_type.code().to_string();
        let url = self.url(&["api", "secrets", &code, name])?;
        ensure_success(self.request(Method::DELETE, url).send().await?).await?;
        Ok(())
    }

    /// Streams `chunks` to the server as a media secret named `name`.
    ///
    /// The metadata frame goes first, then one frame per chunk. Chunks must be
    /// non-empty.
    pub async fn upload_media<S>(&self, name: &str, overwrite: bool, chunks: S) -> Result<MediaUploadResponse>
    where
        S: Stream<Item = std::io::Result<Bytes>> + Send + 'static,
    {
        let head = encode_frame(&UploadFrame::Metadata {
            name: name.to_string(),
            overwrite,
        })?;
        let frames = stream::once(async move { Ok::<_, std::io::Error>(head) }).chain(
            chunks.map(|chunk| chunk.and_then(|data| encode_frame(&UploadFrame::Chunk(data.to_vec())))),
        );

        let url = self.url(&["api", "media"])?;
        let response = self
            .request(Method::POST, url)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(reqwest::Body::wrap_stream(frames))
            .send()
            .await?;
        read_json(ensure_success(response).await?).await
    }

    /// Opens the content of a media secret as a stream of chunks.
    ///
    /// A transfer cut short by the server ends the stream with a
    /// `data_loss` error.
    pub async fn download_media(&self, name: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
        let url = self.url(&["api", "media", name])?;
        let response = ensure_success(self.request(Method::GET, url).send().await?).await?;

        Ok(response
            .bytes_stream()
            .map_err(|e| ClientError::Rpc {
                code: ErrorCode::DataLoss,
                message: format!("Media transfer interrupted: {}", e),
            })
            .boxed())
    }
}

fn encode_frame(frame: &UploadFrame) -> std::io::Result<Bytes> {
    let payload = frame.encode().map_err(std::io::Error::other)?;
    let mut codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_SIZE)
        .new_codec();
    let mut buf = BytesMut::with_capacity(payload.len() + 4);
    codec.encode(Bytes::from(payload), &mut buf)?;
    Ok(buf.freeze())
}

fn with_json<B: Serialize>(builder: RequestBuilder, body: &B) -> Result<RequestBuilder> {
    Ok(builder
        .header(header::CONTENT_TYPE, "application/json")
        .body(sonic_rs::to_vec(body)?))
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
    let bytes = response.bytes().await?;
    Ok(sonic_rs::from_slice(&bytes)?)
}

fn code_for_status(status: StatusCode) -> ErrorCode {
    match status {
        StatusCode::NOT_FOUND => ErrorCode::NotFound,
        StatusCode::CONFLICT => ErrorCode::AlreadyExists,
        StatusCode::BAD_REQUEST => ErrorCode::InvalidArgument,
        StatusCode::UNAUTHORIZED => ErrorCode::Unauthenticated,
        StatusCode::GATEWAY_TIMEOUT => ErrorCode::DeadlineExceeded,
        _ => ErrorCode::Internal,
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let bytes = response.bytes().await.unwrap_or_default();
    Err(match sonic_rs::from_slice::<ErrorBody>(&bytes) {
        Ok(body) => ClientError::Rpc {
            code: body.code,
            message: body.error,
        },
        Err(_) => ClientError::Rpc {
            code: code_for_status(status),
            message: format!("Server answered {}", status),
        },
    })
}
