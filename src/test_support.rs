//! Shared fixtures for unit tests.

use chrono::{Duration, Utc};
use std::sync::Arc;
use wiremock::MockServer;

use crate::models::{Account, NewAccount};
use crate::providers::{LinkedInConfig, LinkedInProvider, ProviderRegistry};
use crate::store::{AccountStore, MemoryStore, Stores};
use crate::{AppState, Config, SharedState};

pub const SUBJECT: &str = "abc123";

/// Registry with a LinkedIn provider pointed at the mock server.
pub fn linkedin_registry(server: &MockServer) -> Arc<ProviderRegistry> {
    let provider = LinkedInProvider::new(LinkedInConfig {
        client_id: "client-123".into(),
        client_secret: "secret-456".into(),
        api_version: "202305".into(),
        oauth_base_url: format!("{}/oauth/v2", server.uri()),
        api_base_url: format!("{}/v2", server.uri()),
        http_timeout: std::time::Duration::from_secs(5),
    })
    .unwrap();

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(provider));
    Arc::new(registry)
}

/// Connect a LinkedIn account whose token expires `expires_in_secs` from now.
pub async fn connect(
    store: &MemoryStore,
    access: &str,
    refresh: Option<&str>,
    expires_in_secs: i64,
) -> Account {
    store
        .connect_account(&NewAccount {
            user_id: "user-1".into(),
            provider: "linkedin".into(),
            subject: SUBJECT.into(),
            display_name: "Ada Lovelace".into(),
            email: Some("ada@example.com".into()),
            profile_image_url: None,
            access_token: access.into(),
            refresh_token: refresh.map(String::from),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        })
        .await
        .unwrap()
}

pub fn test_config() -> Config {
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

/// Full application state over one in-memory store.
pub fn test_state(store: Arc<MemoryStore>, registry: Arc<ProviderRegistry>) -> SharedState {
    Arc::new(AppState::build(test_config(), Stores::from_backend(store), registry))
}
