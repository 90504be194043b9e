//! On-demand token refresh with per-account serialization.

use chrono::Utc;
use dashmap::DashMap;
use reqwest::header::HeaderMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::AppError;
use crate::models::{Account, Token};
use crate::providers::{ProviderAdapter, ProviderRegistry};
use crate::store::TokenStore;

/// Tokens expiring sooner than this are refreshed before use.
pub const REFRESH_SKEW_SECS: i64 = 60;

/// Hands out access tokens that stay valid for at least `REFRESH_SKEW_SECS`.
///
/// The store is the only token cache. Each account has its own async mutex
/// held across read → refresh → write, so concurrent callers for one account
/// see a single refresh and the second caller reads the first one's result.
pub struct TokenRefresher {
    tokens: Arc<dyn TokenStore>,
    registry: Arc<ProviderRegistry>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TokenRefresher {
    pub fn new(tokens: Arc<dyn TokenStore>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            tokens,
            registry,
            locks: DashMap::new(),
        }
    }

    fn adapter(&self, account: &Account) -> Result<Arc<dyn ProviderAdapter>, AppError> {
        self.registry.get(&account.provider).ok_or_else(|| {
            AppError::UnsupportedAccount(format!("no provider registered for {}", account.provider))
        })
    }

    fn lock_for(&self, account_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Return the stored token, refreshing it first if it is about to expire.
    pub async fn ensure_valid(&self, account: &Account) -> Result<Token, AppError> {
        self.ensure_valid_for(account, chrono::Duration::seconds(REFRESH_SKEW_SECS))
            .await
    }

    /// Like `ensure_valid`, with a caller-chosen minimum remaining lifetime.
    pub async fn ensure_valid_for(
        &self,
        account: &Account,
        min_validity: chrono::Duration,
    ) -> Result<Token, AppError> {
        let adapter = self.adapter(account)?;
        self.ensure_valid_with(account, adapter.as_ref(), min_validity)
            .await
    }

    /// Authorization headers built from a freshly validated token.
    pub async fn headers(&self, account: &Account) -> Result<HeaderMap, AppError> {
        let adapter = self.adapter(account)?;
        let token = self
            .ensure_valid_with(
                account,
                adapter.as_ref(),
                chrono::Duration::seconds(REFRESH_SKEW_SECS),
            )
            .await?;
        adapter.auth_headers(&token.access_token)
    }

    async fn ensure_valid_with(
        &self,
        account: &Account,
        adapter: &dyn ProviderAdapter,
        min_validity: chrono::Duration,
    ) -> Result<Token, AppError> {
        let lock = self.lock_for(&account.id);
        let _guard = lock.lock().await;

        let token = self.tokens.get_token(&account.id).await?.ok_or_else(|| {
            AppError::provider_unreachable(format!("token not found for account {}", account.id))
        })?;

        let threshold = Utc::now() + min_validity;
        if token.expires_at >= threshold {
            return Ok(token);
        }

        let refresh_token = token.usable_refresh_token().ok_or_else(|| {
            AppError::AccountNotConnected(format!(
                "{} account {} has no refresh token; reconnect required",
                account.provider, account.id
            ))
        })?;

        debug!(
            "Token for account {} expires at {}, refreshing",
            account.id, token.expires_at
        );

        let tokens = adapter.refresh_token(refresh_token).await?;

        let lifetime_secs = tokens
            .expires_in
            .unwrap_or_else(|| adapter.token_ttl().as_secs());
        let expires_at = i64::try_from(lifetime_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
            .ok_or_else(|| {
                AppError::provider_unreachable(format!(
                    "invalid expires_in {lifetime_secs} in {} refresh response",
                    account.provider
                ))
            })?;

        let refreshed = Token {
            account_id: token.account_id.clone(),
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token.or_else(|| token.refresh_token.clone()),
            expires_at,
        };

        self.tokens.update_token(&refreshed).await?;
        info!("Refreshed {} token for account {}", account.provider, account.id);

        Ok(refreshed)
    }
}
