//! Session lifecycle integration tests over the in-memory store

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use hyper::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tempfile::TempDir;

use vidtube::auth::{SessionGate, TokenConfig, TokenService};
use vidtube::db::schemas::{PublicUser, VideoDoc};
use vidtube::graph::SocialGraphResolver;
use vidtube::logging::AuthEventLog;
use vidtube::services::{
    AccountService, LoginRequest, MediaPayload, MediaService, MediaUploader, RegisterRequest,
    SocialService, UploadedMedia,
};
use vidtube::store::{CredentialStore, MemoryStore};
use vidtube::AppError;

#[derive(Default)]
struct CountingUploader {
    uploads: AtomicUsize,
}

#[async_trait::async_trait]
impl MediaUploader for CountingUploader {
    async fn upload(&self, _local_path: &Path) -> vidtube::Result<UploadedMedia> {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        Ok(UploadedMedia {
            url: format!("https://cdn.test/file{n}.jpg"),
            public_id: format!("file{n}"),
        })
    }

    async fn delete(&self, _public_id: &str) -> vidtube::Result<()> {
        Ok(())
    }
}

struct World {
    store: Arc<MemoryStore>,
    tokens: Arc<TokenService>,
    accounts: AccountService,
    social: SocialService,
    graph: SocialGraphResolver,
    gate: SessionGate,
    _staging: TempDir,
}

fn world() -> World {
    let staging = TempDir::new().unwrap();
    let store = Arc::new(MemoryStore::new());
    let config = TokenConfig {
        access_secret: "integration-access-secret-0123456789abcdef".into(),
        access_expiry_seconds: 900,
        refresh_secret: "integration-refresh-secret-0123456789abcdef".into(),
        refresh_expiry_seconds: 86_400,
    };
    let tokens = Arc::new(TokenService::new(&config, store.clone()));
    let media = Arc::new(MediaService::new(
        Arc::new(CountingUploader::default()),
        staging.path().to_path_buf(),
    ));

    World {
        accounts: AccountService::new(
            store.clone(),
            tokens.clone(),
            media,
            AuthEventLog::new(),
        ),
        social: SocialService::new(store.clone(), store.clone()),
        graph: SocialGraphResolver::new(store.clone()),
        gate: SessionGate::new(tokens.clone(), store.clone()),
        tokens,
        store,
        _staging: staging,
    }
}

fn avatar() -> MediaPayload {
    MediaPayload {
        file_name: "face.jpg".into(),
        content_base64: STANDARD.encode(b"jpeg bytes"),
    }
}

async fn register(world: &World, username: &str) -> PublicUser {
    world
        .accounts
        .register(RegisterRequest {
            full_name: format!("{username} Tester"),
            email: format!("{}@videos.test", username.to_lowercase()),
            username: username.to_string(),
            password: "correct horse".into(),
            avatar: Some(avatar()),
            cover_image: None,
        })
        .await
        .unwrap()
}

fn login_by_username(username: &str) -> LoginRequest {
    LoginRequest {
        email: None,
        username: Some(username.to_string()),
        password: "correct horse".into(),
    }
}

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers
}

#[tokio::test]
async fn test_login_token_resolves_same_identity() {
    let world = world();
    let user = register(&world, "frank").await;

    let session = world.accounts.login(login_by_username("frank")).await.unwrap();
    assert_eq!(
        world.tokens.verify_access(&session.tokens.access_token).unwrap(),
        user.id
    );

    let resolved = world
        .gate
        .authenticate(&bearer(&session.tokens.access_token))
        .await
        .unwrap();
    assert_eq!(resolved.id, user.id);
    assert_eq!(resolved.username, "frank");
}

#[tokio::test]
async fn test_refresh_token_is_single_use() {
    let world = world();
    register(&world, "gina").await;
    let rt1 = world
        .accounts
        .login(login_by_username("gina"))
        .await
        .unwrap()
        .tokens
        .refresh_token;

    let rt2 = world.accounts.refresh(Some(&rt1)).await.unwrap().refresh_token;
    assert_ne!(rt1, rt2);

    let err = world.accounts.refresh(Some(&rt1)).await.unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));

    // the rotated token still works
    world.accounts.refresh(Some(&rt2)).await.unwrap();
}

#[tokio::test]
async fn test_logout_revokes_refresh() {
    let world = world();
    register(&world, "hal").await;
    let session = world.accounts.login(login_by_username("hal")).await.unwrap();

    world.accounts.logout(&session.user).await.unwrap();
    let stored = world.store.find_by_id(&session.user.id).await.unwrap().unwrap();
    assert!(stored.refresh_token.is_none());

    let err = world
        .accounts
        .refresh(Some(&session.tokens.refresh_token))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Unauthorized(_)));
}

#[tokio::test]
async fn test_duplicate_handle_any_casing_conflicts() {
    let world = world();
    register(&world, "bob").await;

    let err = world
        .accounts
        .register(RegisterRequest {
            full_name: "Other Bob".into(),
            email: "other-bob@videos.test".into(),
            username: "Bob".into(),
            password: "correct horse".into(),
            avatar: Some(avatar()),
            cover_image: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(world.store.user_count(), 1);
}

#[tokio::test]
async fn test_channel_profile_counts_three_subscribers() {
    let world = world();
    let channel = register(&world, "studio").await;
    let outsider = register(&world, "outsider").await;

    let mut fans = Vec::new();
    for name in ["ann", "ben", "cat"] {
        let fan = register(&world, name).await;
        world
            .social
            .toggle_subscription(&fan, &channel.id.to_hex())
            .await
            .unwrap();
        fans.push(fan);
    }

    let seen_by_fan = world
        .graph
        .channel_profile(&fans[1].id, "studio")
        .await
        .unwrap();
    assert_eq!(seen_by_fan.subscribers_count, 3);
    assert!(seen_by_fan.is_subscribed);

    let seen_by_outsider = world
        .graph
        .channel_profile(&outsider.id, "STUDIO")
        .await
        .unwrap();
    assert_eq!(seen_by_outsider.subscribers_count, 3);
    assert!(!seen_by_outsider.is_subscribed);

    let fan_profile = world
        .graph
        .channel_profile(&outsider.id, "ann")
        .await
        .unwrap();
    assert_eq!(fan_profile.channels_subscribed_to_count, 1);
}

#[tokio::test]
async fn test_watch_history_newest_first_without_secrets() {
    let world = world();
    let creator = register(&world, "maker").await;
    let viewer = register(&world, "watcher").await;
    world.accounts.login(login_by_username("maker")).await.unwrap();

    let mut videos = Vec::new();
    for title in ["one", "two", "three"] {
        let id = world.store.insert_video(VideoDoc::new(
            creator.id,
            title,
            format!("https://cdn.test/{title}.mp4"),
            format!("https://cdn.test/{title}.jpg"),
        ));
        world.social.record_watch(&viewer, &id.to_hex()).await.unwrap();
        videos.push(id);
    }

    let history = world.graph.watch_history(&viewer.id).await.unwrap();
    let titles: Vec<_> = history.iter().map(|v| v.title.as_str()).collect();
    assert_eq!(titles, vec!["three", "two", "one"]);

    let json = serde_json::to_string(&history).unwrap();
    assert!(!json.contains("password"));
    assert!(!json.contains("refreshToken"));
    assert!(json.contains("\"username\":\"maker\""));
}

#[tokio::test]
async fn test_issue_then_verify_round_trip() {
    let world = world();
    let user = register(&world, "ivy").await;
    let pair = world.tokens.issue_token_pair(&user).unwrap();
    assert_eq!(world.tokens.verify_access(&pair.access_token).unwrap(), user.id);
    assert_eq!(world.tokens.verify_refresh(&pair.refresh_token).unwrap(), user.id);
}
