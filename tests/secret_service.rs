use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{stream, StreamExt, TryStreamExt};

use async_trait::async_trait;
use uuid::Uuid;

use keeper::{
    config::Config,
    error::AppError,
    models::{
        secret::{Secret, SecretMetadata},
        user::User,
    },
    protocol::{SecretType, UploadFrame},
    repositories::{
        memory::MemoryMetadataStore,
        metadata::{MetadataStore, TxWork},
    },
    services::{auth, media, secrets},
    state::AppState,
    storage::local::LocalBlobStore,
};

struct TestContext {
    state: AppState,
    blob_dir: tempfile::TempDir,
}

impl TestContext {
    async fn new() -> Self {
        Self::with_timeout(Duration::from_secs(5)).await
    }

    async fn with_timeout(storage_timeout: Duration) -> Self {
        Self::build(storage_timeout, Arc::new(MemoryMetadataStore::new())).await
    }

    async fn with_metadata(metadata: Arc<dyn MetadataStore>) -> Self {
        Self::build(Duration::from_secs(5), metadata).await
    }

    async fn build(storage_timeout: Duration, metadata: Arc<dyn MetadataStore>) -> Self {
        let blob_dir = tempfile::tempdir().unwrap();
        let mut config = Config::for_tests(blob_dir.path().to_path_buf());
        config.storage_timeout = storage_timeout;

        let blobs = LocalBlobStore::new(blob_dir.path().to_path_buf()).await.unwrap();
        let state = AppState::with_stores(&config, metadata, Arc::new(blobs));
        Self {
            state,
            blob_dir,
        }
    }

    async fn user(&self, login: &str, password: &str) -> User {
        let token = auth::register(&self.state, login, password).await.unwrap();
        auth::authenticate(&self.state, &token).await.unwrap()
    }

    async fn upload(
        &self,
        user: &User,
        name: &str,
        overwrite: bool,
        content: &[u8],
    ) -> Result<(), AppError> {
        let mut frames = vec![Ok(UploadFrame::Metadata {
            name: name.to_string(),
            overwrite,
        })];
        frames.extend(content.chunks(1000).map(|c| Ok(UploadFrame::Chunk(c.to_vec()))));
        media::upload(&self.state, user, stream::iter(frames))
            .await
            .map(|_| ())
    }

    async fn download(&self, user: &User, name: &str) -> Result<Vec<u8>, AppError> {
        let chunks: Vec<Bytes> = media::download(&self.state, user, name)
            .await?
            .try_collect()
            .await?;
        Ok(chunks.concat())
    }
}

/// Memory store whose `add_secret_metadata` always fails with a backend error.
struct BrokenMediaInsert(MemoryMetadataStore);

#[async_trait]
impl MetadataStore for BrokenMediaInsert {
    async fn in_transaction(&self, work: TxWork<'_>) -> Result<(), AppError> {
        self.0.in_transaction(work).await
    }

    async fn create_user(&self, login: &str, password_hash: &str) -> Result<User, AppError> {
        self.0.create_user(login, password_hash).await
    }

    async fn get_user_by_login(&self, login: &str) -> Result<User, AppError> {
        self.0.get_user_by_login(login).await
    }

    async fn get_user_by_uuid(&self, uuid: Uuid) -> Result<User, AppError> {
        self.0.get_user_by_uuid(uuid).await
    }

    async fn add_secret_metadata(
        &self,
        _owner: Uuid,
        _secret_uuid: Uuid,
        _name: &str,
        _secret_type: SecretType,
    ) -> Result<SecretMetadata, AppError> {
        Err(AppError::Io(std::io::Error::other("disk full")))
    }

    async fn add_plain_secret(
        &self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
        data: &[u8],
    ) -> Result<SecretMetadata, AppError> {
        self.0.add_plain_secret(owner, name, secret_type, data).await
    }

    async fn update_plain_secret_data(
        &self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
        data: &[u8],
    ) -> Result<(), AppError> {
        self.0.update_plain_secret_data(owner, name, secret_type, data).await
    }

    async fn update_secret_metadata_uuid(
        &self,
        owner: Uuid,
        old_uuid: Uuid,
        new_uuid: Uuid,
        secret_type: SecretType,
    ) -> Result<(), AppError> {
        self.0
            .update_secret_metadata_uuid(owner, old_uuid, new_uuid, secret_type)
            .await
    }

    async fn remove_secret_by_uuid(&self, uuid: Uuid) -> Result<(), AppError> {
        self.0.remove_secret_by_uuid(uuid).await
    }

    async fn get_user_secret_by_name(
        &self,
        owner: Uuid,
        name: &str,
        secret_type: SecretType,
    ) -> Result<Secret, AppError> {
        self.0.get_user_secret_by_name(owner, name, secret_type).await
    }

    async fn get_user_secrets_metadata_by_type(
        &self,
        owner: Uuid,
        secret_type: SecretType,
    ) -> Result<Vec<SecretMetadata>, AppError> {
        self.0.get_user_secrets_metadata_by_type(owner, secret_type).await
    }
}

fn entries(dir: &Path) -> Vec<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn plain_secret_lifecycle() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;

    secrets::set(&ctx.state, &alice, SecretType::Text, "note", b"sealed-hi")
        .await
        .unwrap();
    let stored = secrets::get(&ctx.state, &alice, SecretType::Text, "note")
        .await
        .unwrap();
    assert_eq!(stored.content, b"sealed-hi");
    assert_eq!(stored.name, "note");

    secrets::update(&ctx.state, &alice, SecretType::Text, "note", b"sealed-bye")
        .await
        .unwrap();
    let stored = secrets::get(&ctx.state, &alice, SecretType::Text, "note")
        .await
        .unwrap();
    assert_eq!(stored.content, b"sealed-bye");
    assert!(stored.updated >= stored.created);

    let listed = secrets::list(&ctx.state, &alice, SecretType::Text).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "note");
}

#[tokio::test]
async fn duplicate_names_conflict_only_within_owner_and_type() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;
    let bob = ctx.user("bob", "pw2").await;

    secrets::set(&ctx.state, &alice, SecretType::Credentials, "n", b"1")
        .await
        .unwrap();
    let err = secrets::set(&ctx.state, &alice, SecretType::Credentials, "n", b"2")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));

    secrets::set(&ctx.state, &alice, SecretType::Card, "n", b"3")
        .await
        .unwrap();
    secrets::set(&ctx.state, &bob, SecretType::Credentials, "n", b"4")
        .await
        .unwrap();
}

#[tokio::test]
async fn update_never_creates() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;

    let err = secrets::update(&ctx.state, &alice, SecretType::Text, "ghost", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(secrets::list(&ctx.state, &alice, SecretType::Text)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn delete_then_get_is_not_found() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;

    secrets::set(&ctx.state, &alice, SecretType::Text, "note", b"x")
        .await
        .unwrap();
    secrets::delete(&ctx.state, &alice, SecretType::Text, "note")
        .await
        .unwrap();

    let err = secrets::get(&ctx.state, &alice, SecretType::Text, "note")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    let err = secrets::delete(&ctx.state, &alice, SecretType::Text, "note")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn secrets_are_isolated_per_owner() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;
    let bob = ctx.user("bob", "pw2").await;

    secrets::set(&ctx.state, &alice, SecretType::Text, "note", b"hi")
        .await
        .unwrap();
    let err = secrets::get(&ctx.state, &bob, SecretType::Text, "note")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(secrets::list(&ctx.state, &bob, SecretType::Text)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn media_type_is_rejected_on_plain_calls() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;

    let err = secrets::set(&ctx.state, &alice, SecretType::Media, "photo.jpg", b"x")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));
}

#[tokio::test]
async fn concurrent_sets_have_one_winner() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;

    let attempts = (0..8).map(|i| {
        let state = ctx.state.clone();
        let alice = alice.clone();
        tokio::spawn(async move {
            secrets::set(&state, &alice, SecretType::Text, "race", format!("{i}").as_bytes()).await
        })
    });
    let results = futures::future::join_all(attempts).await;

    let won = results.iter().filter(|r| matches!(r, Ok(Ok(())))).count();
    let lost = results
        .iter()
        .filter(|r| matches!(r, Ok(Err(AppError::AlreadyExists(_)))))
        .count();
    assert_eq!((won, lost), (1, 7));
}

#[tokio::test]
async fn media_round_trip_and_delete() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;
    let content: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();

    ctx.upload(&alice, "photo.jpg", false, &content).await.unwrap();
    assert_eq!(ctx.download(&alice, "photo.jpg").await.unwrap(), content);

    let listed = secrets::list(&ctx.state, &alice, SecretType::Media).await.unwrap();
    assert_eq!(listed.len(), 1);

    secrets::delete(&ctx.state, &alice, SecretType::Media, "photo.jpg")
        .await
        .unwrap();
    assert!(entries(ctx.blob_dir.path()).is_empty());
    let err = ctx.download(&alice, "photo.jpg").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn duplicate_upload_and_missing_overwrite() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;

    ctx.upload(&alice, "photo.jpg", false, b"first").await.unwrap();
    let err = ctx.upload(&alice, "photo.jpg", false, b"second").await.unwrap_err();
    assert!(matches!(err, AppError::AlreadyExists(_)));

    let err = ctx.upload(&alice, "other.jpg", true, b"third").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    assert_eq!(ctx.download(&alice, "photo.jpg").await.unwrap(), b"first");
}

#[tokio::test]
async fn overwrite_replaces_content() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;

    ctx.upload(&alice, "photo.jpg", false, b"old content").await.unwrap();
    ctx.upload(&alice, "photo.jpg", true, b"new content").await.unwrap();
    assert_eq!(ctx.download(&alice, "photo.jpg").await.unwrap(), b"new content");
}

#[tokio::test]
async fn aborted_overwrite_keeps_previous_content() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;
    ctx.upload(&alice, "photo.jpg", false, b"original").await.unwrap();

    let frames = stream::iter(vec![
        Ok(UploadFrame::Metadata {
            name: "photo.jpg".to_string(),
            overwrite: true,
        }),
        Ok(UploadFrame::Chunk(b"half of the new".to_vec())),
        Err(AppError::DataLoss("connection reset".to_string())),
    ]);
    let err = media::upload(&ctx.state, &alice, frames).await.unwrap_err();
    assert!(matches!(err, AppError::DataLoss(_)));

    assert_eq!(ctx.download(&alice, "photo.jpg").await.unwrap(), b"original");
    assert_eq!(entries(ctx.blob_dir.path()).len(), 1);
}

#[tokio::test]
async fn upload_requires_metadata_first() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;

    let frames = stream::iter(vec![Ok(UploadFrame::Chunk(b"data".to_vec()))]);
    let err = media::upload(&ctx.state, &alice, frames).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));

    let frames = stream::iter(vec![
        Ok(UploadFrame::Metadata {
            name: "a.bin".to_string(),
            overwrite: false,
        }),
        Ok(UploadFrame::Metadata {
            name: "b.bin".to_string(),
            overwrite: false,
        }),
    ]);
    let err = media::upload(&ctx.state, &alice, frames).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));
    assert!(entries(ctx.blob_dir.path()).is_empty());
}

#[tokio::test]
async fn stalled_upload_hits_the_deadline() {
    let ctx = TestContext::with_timeout(Duration::from_millis(100)).await;
    let alice = ctx.user("alice", "pw1").await;

    let frames = stream::iter(vec![Ok(UploadFrame::Metadata {
        name: "slow.bin".to_string(),
        overwrite: false,
    })])
    .chain(stream::pending());
    let err = media::upload(&ctx.state, &alice, frames).await.unwrap_err();
    assert!(matches!(err, AppError::DeadlineExceeded(_)));
    assert!(entries(ctx.blob_dir.path()).is_empty());
}

#[tokio::test]
async fn dropped_upload_is_aborted() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;

    let frames = stream::iter(vec![
        Ok(UploadFrame::Metadata {
            name: "gone.bin".to_string(),
            overwrite: false,
        }),
        Ok(UploadFrame::Chunk(b"partial".to_vec())),
    ])
    .chain(stream::pending());
    let cancelled = tokio::time::timeout(
        Duration::from_millis(200),
        media::upload(&ctx.state, &alice, frames),
    )
    .await;
    assert!(cancelled.is_err());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(entries(ctx.blob_dir.path()).is_empty());
    let err = ctx.download(&alice, "gone.bin").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn missing_blob_behind_metadata_is_internal() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;
    ctx.upload(&alice, "photo.jpg", false, b"content").await.unwrap();

    let secret = ctx
        .state
        .metadata
        .get_user_secret_by_name(alice.uuid, "photo.jpg", SecretType::Media)
        .await
        .unwrap();
    std::fs::remove_file(ctx.blob_dir.path().join(secret.meta.uuid.to_string())).unwrap();

    let err = ctx.download(&alice, "photo.jpg").await.unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));
}

#[tokio::test]
async fn empty_chunk_is_rejected() {
    let ctx = TestContext::new().await;
    let alice = ctx.user("alice", "pw1").await;

    let frames = stream::iter(vec![
        Ok(UploadFrame::Metadata {
            name: "empty.bin".to_string(),
            overwrite: false,
        }),
        Ok(UploadFrame::Chunk(Vec::new())),
    ]);
    let err = media::upload(&ctx.state, &alice, frames).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidArgument(_)));
    assert!(entries(ctx.blob_dir.path()).is_empty());

    let err = ctx.download(&alice, "empty.bin").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn failed_metadata_insert_discards_the_blob() {
    let store = BrokenMediaInsert(MemoryMetadataStore::new());
    let ctx = TestContext::with_metadata(Arc::new(store)).await;
    let alice = ctx.user("alice", "pw1").await;

    let err = ctx.upload(&alice, "photo.jpg", false, b"content").await.unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));
    assert!(entries(ctx.blob_dir.path()).is_empty());
}
