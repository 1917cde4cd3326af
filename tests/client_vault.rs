use std::net::SocketAddr;
use std::sync::Arc;

use keeper::{
    client::{
        config::ClientConfig,
        connector::Connector,
        error::ClientError,
        session::USERDATA_FILE,
        vault::{Card, Credentials, SecretEntry, Vault},
    },
    config::Config,
    protocol::{ErrorCode, SecretType},
    repositories::memory::MemoryMetadataStore,
    router,
    state::AppState,
    storage::local::LocalBlobStore,
};

struct TestContext {
    config: ClientConfig,
    _server_dir: tempfile::TempDir,
    _work_dir: tempfile::TempDir,
}

impl TestContext {
    async fn new() -> Self {
        let server_dir = tempfile::tempdir().unwrap();
        let server_config = Config::for_tests(server_dir.path().to_path_buf());
        let blobs = LocalBlobStore::new(server_dir.path().to_path_buf()).await.unwrap();
        let state = AppState::with_stores(
            &server_config,
            Arc::new(MemoryMetadataStore::new()),
            Arc::new(blobs),
        );
        let app = router::app(state).unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .await
            .unwrap();
        });

        let work_dir = tempfile::tempdir().unwrap();
        Self {
            config: ClientConfig {
                server_url: format!("http://{addr}"),
                work_dir: work_dir.path().join("keeperData"),
            },
            _server_dir: server_dir,
            _work_dir: work_dir,
        }
    }
}

fn card() -> Card {
    Card {
        number: "4111 1111 1111 1111".to_string(),
        holder: "JOHN DOE".to_string(),
        cvv: 123,
        expiry: "12/30".to_string(),
    }
}

#[tokio::test]
async fn plain_secrets_round_trip() {
    let ctx = TestContext::new().await;
    let vault = Vault::register(&ctx.config, "alice", "pw1").await.unwrap();
    assert_eq!(vault.ping().await.unwrap(), "pong!");

    let creds = SecretEntry::Credentials(Credentials {
        login: "alice@mail".to_string(),
        password: "hunter2".to_string(),
    });
    vault.set("mail", &creds).await.unwrap();
    vault.set("visa", &SecretEntry::Card(card())).await.unwrap();
    vault
        .set("note", &SecretEntry::Text("hi".to_string()))
        .await
        .unwrap();

    assert_eq!(vault.get(SecretType::Credentials, "mail").await.unwrap(), creds);
    assert_eq!(
        vault.get(SecretType::Card, "visa").await.unwrap(),
        SecretEntry::Card(card())
    );
    assert_eq!(
        vault.get(SecretType::Text, "note").await.unwrap(),
        SecretEntry::Text("hi".to_string())
    );

    vault
        .update("note", &SecretEntry::Text("bye".to_string()))
        .await
        .unwrap();
    assert_eq!(
        vault.get(SecretType::Text, "note").await.unwrap(),
        SecretEntry::Text("bye".to_string())
    );

    let listed = vault.list(SecretType::Text).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].info.name, "note");

    vault.delete(SecretType::Text, "note").await.unwrap();
    let err = vault.get(SecretType::Text, "note").await.unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::NotFound));
}

#[tokio::test]
async fn server_only_sees_ciphertext() {
    let ctx = TestContext::new().await;
    let vault = Vault::register(&ctx.config, "alice", "pw1").await.unwrap();
    vault
        .set("note", &SecretEntry::Text("plain words".to_string()))
        .await
        .unwrap();

    let token = Connector::new(&ctx.config.server_url)
        .unwrap()
        .login("alice", "pw1")
        .await
        .unwrap();
    let raw = Connector::new(&ctx.config.server_url)
        .unwrap()
        .with_token(token)
        .get_secret(SecretType::Text, "note")
        .await
        .unwrap();
    assert!(!String::from_utf8_lossy(&raw.content).contains("plain words"));
}

#[tokio::test]
async fn tampered_content_fails_to_decrypt() {
    let ctx = TestContext::new().await;
    let vault = Vault::register(&ctx.config, "alice", "pw1").await.unwrap();

    let token = Connector::new(&ctx.config.server_url)
        .unwrap()
        .login("alice", "pw1")
        .await
        .unwrap();
    Connector::new(&ctx.config.server_url)
        .unwrap()
        .with_token(token)
        .set_secret(SecretType::Text, "junk", &[0u8; 64])
        .await
        .unwrap();

    let err = vault.get(SecretType::Text, "junk").await.unwrap_err();
    assert!(matches!(err, ClientError::Crypto(_)));
}

#[tokio::test]
async fn invalid_card_never_leaves_the_client() {
    let ctx = TestContext::new().await;
    let vault = Vault::register(&ctx.config, "alice", "pw1").await.unwrap();

    let mut bad = card();
    bad.cvv = 5;
    let err = vault.set("visa", &SecretEntry::Card(bad)).await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
    assert!(vault.list(SecretType::Card).await.unwrap().is_empty());
}

#[tokio::test]
async fn media_round_trip() {
    let ctx = TestContext::new().await;
    let vault = Vault::register(&ctx.config, "alice", "pw1").await.unwrap();

    let source_dir = tempfile::tempdir().unwrap();
    let source = source_dir.path().join("photo.bin");
    let content: Vec<u8> = (0..(2 * 1024 * 1024 + 777u32)).map(|i| (i % 253) as u8).collect();
    std::fs::write(&source, &content).unwrap();

    vault
        .set("photo.bin", &SecretEntry::Media(source.clone()))
        .await
        .unwrap();
    let local = vault.media_dir().join("photo.bin");
    assert_eq!(std::fs::read(&local).unwrap(), content);

    let listed = vault.list(SecretType::Media).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].local);

    std::fs::remove_file(&local).unwrap();
    assert!(!vault.list(SecretType::Media).await.unwrap()[0].local);

    let downloaded = vault.get(SecretType::Media, "photo.bin").await.unwrap();
    assert_eq!(downloaded, SecretEntry::Media(local.clone()));
    assert_eq!(std::fs::read(&local).unwrap(), content);

    let small = source_dir.path().join("small.bin");
    std::fs::write(&small, b"tiny").unwrap();
    let err = vault
        .set("photo.bin", &SecretEntry::Media(small))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Some(ErrorCode::AlreadyExists));

    std::fs::write(&source, b"replacement").unwrap();
    vault
        .update("photo.bin", &SecretEntry::Media(source.clone()))
        .await
        .unwrap();
    std::fs::remove_file(&local).unwrap();
    vault.get(SecretType::Media, "photo.bin").await.unwrap();
    assert_eq!(std::fs::read(&local).unwrap(), b"replacement");

    vault.delete(SecretType::Media, "photo.bin").await.unwrap();
    assert!(!local.exists());
    assert!(vault.list(SecretType::Media).await.unwrap().is_empty());
}

#[tokio::test]
async fn media_names_must_be_file_names() {
    let ctx = TestContext::new().await;
    let vault = Vault::register(&ctx.config, "alice", "pw1").await.unwrap();

    let err = vault
        .get(SecretType::Media, "../outside.bin")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));
}

#[tokio::test]
async fn session_survives_restart() {
    let ctx = TestContext::new().await;
    {
        let vault = Vault::register(&ctx.config, "alice", "pw1").await.unwrap();
        vault
            .set("note", &SecretEntry::Text("hi".to_string()))
            .await
            .unwrap();
    }

    let raw = std::fs::read_to_string(ctx.config.work_dir.join(USERDATA_FILE)).unwrap();
    assert!(raw.contains("\"login\":\"alice\""));
    assert!(!raw.contains("pw1"));

    let vault = Vault::resume(&ctx.config, "pw1").await.unwrap().unwrap();
    assert_eq!(vault.login_name(), "alice");
    assert_eq!(
        vault.get(SecretType::Text, "note").await.unwrap(),
        SecretEntry::Text("hi".to_string())
    );

    vault.logout().await.unwrap();
    assert!(Vault::resume(&ctx.config, "pw1").await.unwrap().is_none());
}

#[tokio::test]
async fn wrong_password_drops_the_session() {
    let ctx = TestContext::new().await;
    Vault::register(&ctx.config, "alice", "pw1").await.unwrap();

    let err = Vault::resume(&ctx.config, "nope").await.unwrap_err();
    assert!(matches!(err, ClientError::Session(_)));
    assert!(!ctx.config.work_dir.join(USERDATA_FILE).exists());

    let vault = Vault::login(&ctx.config, "alice", "pw1").await.unwrap();
    assert!(vault.list(SecretType::Text).await.unwrap().is_empty());
}
