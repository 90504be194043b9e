//! Persistence for connected accounts, their OAuth tokens and the post queue.
//!
//! `PgStore` is the production backend; `MemoryStore` backs tests and local
//! runs without a database.

pub mod db;
pub mod memory;

pub use db::PgStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::error::AppError;
use crate::models::{Account, NewAccount, NewPost, PostUpdate, ScheduledPost, Token};

/// One OAuth token record per connected account.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get_token(&self, account_id: &str) -> Result<Option<Token>, AppError>;

    /// Overwrite the account's token record in place.
    async fn update_token(&self, token: &Token) -> Result<(), AppError>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Create the account (or refresh its metadata on reconnect) and replace
    /// its token with the one from the OAuth flow.
    async fn connect_account(&self, new: &NewAccount) -> Result<Account, AppError>;

    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, AppError>;

    async fn list_accounts(&self, user_id: &str) -> Result<Vec<Account>, AppError>;

    /// Accounts with a refresh token whose access token expires within the window.
    async fn expiring_accounts(&self, within_minutes: i64) -> Result<Vec<Account>, AppError>;
}

#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn create_post(&self, new: &NewPost) -> Result<ScheduledPost, AppError>;

    async fn get_post(&self, user_id: &str, post_id: &str)
        -> Result<Option<ScheduledPost>, AppError>;

    /// Newest scheduled time first.
    async fn list_posts(&self, user_id: &str) -> Result<Vec<ScheduledPost>, AppError>;

    /// Fails with `Conflict` when the post is already published.
    async fn update_post(
        &self,
        user_id: &str,
        post_id: &str,
        update: &PostUpdate,
    ) -> Result<ScheduledPost, AppError>;

    async fn delete_post(&self, user_id: &str, post_id: &str) -> Result<(), AppError>;

    /// Scheduled posts due at `now`, oldest first.
    async fn due_posts(&self, now: DateTime<Utc>, limit: i64)
        -> Result<Vec<ScheduledPost>, AppError>;

    /// Returns false when the post is gone or already published.
    async fn mark_published(&self, post_id: &str, at: DateTime<Utc>) -> Result<bool, AppError>;

    /// Returns false when the post is gone or already published.
    async fn mark_failed(
        &self,
        post_id: &str,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError>;
}

/// The three store seams, usually backed by one concrete store.
#[derive(Clone)]
pub struct Stores {
    pub tokens: Arc<dyn TokenStore>,
    pub accounts: Arc<dyn AccountStore>,
    pub posts: Arc<dyn ScheduleStore>,
}

impl Stores {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: TokenStore + AccountStore + ScheduleStore + 'static,
    {
        Self {
            tokens: backend.clone(),
            accounts: backend.clone(),
            posts: backend,
        }
    }
}
