//! End-to-end publishing against a mocked LinkedIn, over the in-memory store.

use chrono::{Duration, Utc};
use serde_json::json;
use std::io::Write;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use social_scheduler::models::{MediaKind, NewAccount, NewPost, PostStatus};
use social_scheduler::providers::{LinkedInConfig, LinkedInProvider, ProviderRegistry};
use social_scheduler::store::{AccountStore, MemoryStore, ScheduleStore, Stores, TokenStore};
use social_scheduler::{AppState, Config};

fn config() -> Config {
    Config {
        host: "127.0.0.1".into(),
        port: 0,
        database_url: None,
        master_key: None,
        internal_api_secret: "internal-secret".into(),
        linkedin_client_id: Some("client-123".into()),
        linkedin_client_secret: Some("secret-456".into()),
        linkedin_api_version: "202305".into(),
        linkedin_oauth_base_url: String::new(),
        linkedin_api_base_url: String::new(),
        http_timeout: std::time::Duration::from_secs(5),
        scheduler_interval: std::time::Duration::from_secs(30),
        scheduler_batch_size: 50,
        max_concurrent_publishes: 4,
        publish_timeout: std::time::Duration::from_secs(10),
        refresh_sweep_interval: std::time::Duration::from_secs(300),
        refresh_sweep_window_mins: 10,
    }
}

fn state(store: Arc<MemoryStore>, server: &MockServer) -> AppState {
    let mut config = config();
    config.linkedin_oauth_base_url = format!("{}/oauth/v2", server.uri());
    config.linkedin_api_base_url = format!("{}/v2", server.uri());

    let provider = LinkedInProvider::new(LinkedInConfig {
        client_id: "client-123".into(),
        client_secret: "secret-456".into(),
        api_version: config.linkedin_api_version.clone(),
        oauth_base_url: config.linkedin_oauth_base_url.clone(),
        api_base_url: config.linkedin_api_base_url.clone(),
        http_timeout: config.http_timeout,
    })
    .unwrap();
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(provider));

    AppState::build(config, Stores::from_backend(store), Arc::new(registry))
}

async fn connect(store: &MemoryStore, expires_in_secs: i64) -> social_scheduler::models::Account {
    store
        .connect_account(&NewAccount {
            user_id: "user-1".into(),
            provider: "linkedin".into(),
            subject: "abc123".into(),
            display_name: "Ada Lovelace".into(),
            email: None,
            profile_image_url: None,
            access_token: "a1".into(),
            refresh_token: Some("r1".into()),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_expired_token_refreshed_before_publish() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/v2/accessToken"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=r1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "access_token": "a2", "expires_in": 3600 })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/ugcPosts"))
        .and(header("authorization", "Bearer a2"))
        .and(header("linkedin-version", "202305"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "urn:li:share:7" })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let account = connect(&store, -10).await;
    let state = state(store.clone(), &server);

    let response = state.publisher.publish(&account, "hello", None).await.unwrap();
    assert_eq!(response, json!({ "id": "urn:li:share:7" }));

    let token = store.get_token(&account.id).await.unwrap().unwrap();
    assert_eq!(token.access_token, "a2");
    assert_eq!(token.refresh_token.as_deref(), Some("r1"));
}

#[tokio::test]
async fn test_scheduler_publishes_due_video_post() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/assets"))
        .and(body_partial_json(json!({
            "registerUploadRequest": {
                "recipes": ["urn:li:digitalmediaRecipe:feedshare-video"],
                "owner": "urn:li:person:abc123"
            }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": {
                "uploadMechanism": {
                    "com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest": {
                        "uploadUrl": format!("{}/upload/vid", server.uri())
                    }
                },
                "asset": "urn:li:digitalmediaAsset:V1"
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/upload/vid"))
        .and(header("content-type", "video/mp4"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/ugcPosts"))
        .and(body_partial_json(json!({
            "specificContent": {
                "com.linkedin.ugc.ShareContent": { "shareMediaCategory": "VIDEO" }
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "id": "urn:li:share:8" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    file.write_all(b"not really a video").unwrap();

    let store = Arc::new(MemoryStore::new());
    let account = connect(&store, 3600).await;
    let state = state(store.clone(), &server);
    let post = store
        .create_post(&NewPost {
            user_id: "user-1".into(),
            account_id: account.id.clone(),
            content: "launch day".into(),
            media_path: Some(file.path().to_string_lossy().into_owned()),
            media_kind: Some(MediaKind::Video),
            status: PostStatus::Scheduled,
            scheduled_time: Utc::now() - Duration::seconds(1),
        })
        .await
        .unwrap();

    assert_eq!(state.scheduler.tick().await.unwrap(), 1);

    let stored = store.get_post("user-1", &post.id).await.unwrap().unwrap();
    assert_eq!(stored.status, PostStatus::Published);
    assert!(stored.published_at.is_some());
}

#[tokio::test]
async fn test_future_post_is_left_alone() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryStore::new());
    let account = connect(&store, 3600).await;
    let state = state(store.clone(), &server);
    store
        .create_post(&NewPost {
            user_id: "user-1".into(),
            account_id: account.id,
            content: "later".into(),
            media_path: None,
            media_kind: None,
            status: PostStatus::Scheduled,
            scheduled_time: Utc::now() + Duration::hours(1),
        })
        .await
        .unwrap();

    assert_eq!(state.scheduler.tick().await.unwrap(), 0);
}
