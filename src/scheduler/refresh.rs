//! Background token refresh sweep.
//!
//! Finds accounts whose tokens expire within the window and refreshes them
//! through the same `TokenRefresher` used by publishing, so sweeps and
//! publishes never race on one account's token.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::publish::TokenRefresher;
use crate::store::AccountStore;

/// Start the refresh sweep loop.
pub async fn refresh_daemon(
    accounts: Arc<dyn AccountStore>,
    refresher: Arc<TokenRefresher>,
    interval: Duration,
    window_mins: i64,
) {
    info!(
        "Token refresh sweep started (interval: {}s, window: {}m)",
        interval.as_secs(),
        window_mins
    );

    loop {
        tokio::time::sleep(interval).await;
        if let Err(e) = refresh_cycle(accounts.as_ref(), &refresher, window_mins).await {
            error!("Refresh cycle error: {e}");
        }
    }
}

/// Refresh every expiring account once. Returns how many refreshed cleanly.
pub async fn refresh_cycle(
    accounts: &dyn AccountStore,
    refresher: &TokenRefresher,
    window_mins: i64,
) -> Result<usize, AppError> {
    let expiring = accounts.expiring_accounts(window_mins).await?;
    let window = chrono::Duration::minutes(window_mins);

    if expiring.is_empty() {
        return Ok(0);
    }

    info!("Found {} tokens to refresh", expiring.len());

    let mut refreshed = 0;
    for account in expiring {
        match refresher.ensure_valid_for(&account, window).await {
            Ok(_) => refreshed += 1,
            Err(e) => warn!(
                "Failed to refresh {} token for account {}: {e}",
                account.provider, account.id
            ),
        }
    }

    Ok(refreshed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, TokenStore};
    use crate::test_support::{connect, linkedin_registry};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_cycle_refreshes_expiring_and_survives_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/accessToken"))
            .and(body_string_contains("refresh_token=good"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "access_token": "fresh", "expires_in": 3600 })),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/oauth/v2/accessToken"))
            .and(body_string_contains("refresh_token=bad"))
            .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let good = connect(&store, "old", Some("good"), 120).await;

        let bad = crate::models::NewAccount {
            user_id: "user-2".into(),
            provider: "linkedin".into(),
            subject: "other".into(),
            display_name: "Grace Hopper".into(),
            email: None,
            profile_image_url: None,
            access_token: "old".into(),
            refresh_token: Some("bad".into()),
            expires_at: chrono::Utc::now() - chrono::Duration::seconds(30),
        };
        store.connect_account(&bad).await.unwrap();

        let refresher = TokenRefresher::new(store.clone(), linkedin_registry(&server));
        let refreshed = refresh_cycle(store.as_ref(), &refresher, 10).await.unwrap();

        assert_eq!(refreshed, 1);
        let token = store.get_token(&good.id).await.unwrap().unwrap();
        assert_eq!(token.access_token, "fresh");
    }
}
