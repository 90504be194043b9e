//! In-memory store for tests and local runs without PostgreSQL.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountStore, ScheduleStore, TokenStore};
use crate::error::AppError;
use crate::models::{
    Account, NewAccount, NewPost, PostStatus, PostUpdate, ScheduledPost, Token,
};

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    tokens: HashMap<String, Token>,
    posts: HashMap<String, ScheduledPost>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    token_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of token writes since creation (connects included).
    pub fn token_writes(&self) -> usize {
        self.token_writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn get_token(&self, account_id: &str) -> Result<Option<Token>, AppError> {
        Ok(self.inner.read().await.tokens.get(account_id).cloned())
    }

    async fn update_token(&self, token: &Token) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        if !inner.accounts.contains_key(&token.account_id) {
            return Err(AppError::NotFound("account".into()));
        }
        inner.tokens.insert(token.account_id.clone(), token.clone());
        self.token_writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn connect_account(&self, new: &NewAccount) -> Result<Account, AppError> {
        let mut inner = self.inner.write().await;

        let existing = inner
            .accounts
            .values()
            .find(|a| a.user_id == new.user_id && a.provider == new.provider && a.subject == new.subject)
            .cloned();

        let account = match existing {
            Some(mut account) => {
                account.display_name = new.display_name.clone();
                account.email = new.email.clone();
                account.profile_image_url = new.profile_image_url.clone();
                account
            }
            None => Account {
                id: Uuid::new_v4().to_string(),
                user_id: new.user_id.clone(),
                provider: new.provider.clone(),
                subject: new.subject.clone(),
                display_name: new.display_name.clone(),
                email: new.email.clone(),
                profile_image_url: new.profile_image_url.clone(),
                created_at: Utc::now(),
            },
        };

        // A reconnect without a new refresh token keeps the old one
        let previous_refresh = inner
            .tokens
            .get(&account.id)
            .and_then(|t| t.refresh_token.clone());

        inner.tokens.insert(
            account.id.clone(),
            Token {
                account_id: account.id.clone(),
                access_token: new.access_token.clone(),
                refresh_token: new.refresh_token.clone().or(previous_refresh),
                expires_at: new.expires_at,
            },
        );
        inner.accounts.insert(account.id.clone(), account.clone());
        self.token_writes.fetch_add(1, Ordering::SeqCst);

        Ok(account)
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, AppError> {
        Ok(self.inner.read().await.accounts.get(account_id).cloned())
    }

    async fn list_accounts(&self, user_id: &str) -> Result<Vec<Account>, AppError> {
        let inner = self.inner.read().await;
        let mut accounts: Vec<Account> = inner
            .accounts
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(accounts)
    }

    async fn expiring_accounts(&self, within_minutes: i64) -> Result<Vec<Account>, AppError> {
        let cutoff = Utc::now() + Duration::minutes(within_minutes);
        let inner = self.inner.read().await;
        Ok(inner
            .tokens
            .values()
            .filter(|t| t.expires_at < cutoff && t.usable_refresh_token().is_some())
            .filter_map(|t| inner.accounts.get(&t.account_id).cloned())
            .collect())
    }
}

#[async_trait]
impl ScheduleStore for MemoryStore {
    async fn create_post(&self, new: &NewPost) -> Result<ScheduledPost, AppError> {
        let now = Utc::now();
        let post = ScheduledPost {
            id: Uuid::new_v4().to_string(),
            user_id: new.user_id.clone(),
            account_id: new.account_id.clone(),
            content: new.content.clone(),
            media_path: new.media_path.clone(),
            media_kind: new.media_kind,
            status: new.status,
            scheduled_time: new.scheduled_time,
            published_at: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .write()
            .await
            .posts
            .insert(post.id.clone(), post.clone());
        Ok(post)
    }

    async fn get_post(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> Result<Option<ScheduledPost>, AppError> {
        Ok(self
            .inner
            .read()
            .await
            .posts
            .get(post_id)
            .filter(|p| p.user_id == user_id)
            .cloned())
    }

    async fn list_posts(&self, user_id: &str) -> Result<Vec<ScheduledPost>, AppError> {
        let inner = self.inner.read().await;
        let mut posts: Vec<ScheduledPost> = inner
            .posts
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        posts.sort_by(|a, b| b.scheduled_time.cmp(&a.scheduled_time));
        Ok(posts)
    }

    async fn update_post(
        &self,
        user_id: &str,
        post_id: &str,
        update: &PostUpdate,
    ) -> Result<ScheduledPost, AppError> {
        let mut inner = self.inner.write().await;
        let post = inner
            .posts
            .get_mut(post_id)
            .filter(|p| p.user_id == user_id)
            .ok_or_else(|| AppError::NotFound("post".into()))?;

        if post.status == PostStatus::Published {
            return Err(AppError::Conflict("published posts cannot be edited".into()));
        }

        update.apply(post, Utc::now());
        Ok(post.clone())
    }

    async fn delete_post(&self, user_id: &str, post_id: &str) -> Result<(), AppError> {
        let mut inner = self.inner.write().await;
        match inner.posts.get(post_id) {
            Some(p) if p.user_id == user_id => {
                inner.posts.remove(post_id);
                Ok(())
            }
            _ => Err(AppError::NotFound("post".into())),
        }
    }

    async fn due_posts(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ScheduledPost>, AppError> {
        let inner = self.inner.read().await;
        let mut due: Vec<ScheduledPost> = inner
            .posts
            .values()
            .filter(|p| p.status == PostStatus::Scheduled && p.scheduled_time <= now)
            .cloned()
            .collect();
        due.sort_by(|a, b| a.scheduled_time.cmp(&b.scheduled_time));
        due.truncate(limit.max(0) as usize);
        Ok(due)
    }

    async fn mark_published(&self, post_id: &str, at: DateTime<Utc>) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        match inner.posts.get_mut(post_id) {
            Some(post) if post.status != PostStatus::Published => {
                post.status = PostStatus::Published;
                post.published_at = Some(at);
                post.error_message = None;
                post.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_failed(
        &self,
        post_id: &str,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut inner = self.inner.write().await;
        match inner.posts.get_mut(post_id) {
            Some(post) if post.status != PostStatus::Published => {
                post.status = PostStatus::Failed;
                post.error_message = Some(message.to_string());
                post.updated_at = at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(user_id: &str, refresh: Option<&str>, expires_in_secs: i64) -> NewAccount {
        NewAccount {
            user_id: user_id.into(),
            provider: "linkedin".into(),
            subject: "abc123".into(),
            display_name: "Ada Lovelace".into(),
            email: None,
            profile_image_url: None,
            access_token: "a1".into(),
            refresh_token: refresh.map(String::from),
            expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        }
    }

    fn new_post(user_id: &str, account_id: &str, offset_secs: i64) -> NewPost {
        NewPost {
            user_id: user_id.into(),
            account_id: account_id.into(),
            content: "hello".into(),
            media_path: None,
            media_kind: None,
            status: PostStatus::Scheduled,
            scheduled_time: Utc::now() + Duration::seconds(offset_secs),
        }
    }

    #[tokio::test]
    async fn test_reconnect_keeps_account_and_refresh_token() {
        let store = MemoryStore::new();
        let first = store
            .connect_account(&new_account("u1", Some("r1"), 3600))
            .await
            .unwrap();
        let second = store
            .connect_account(&new_account("u1", None, 7200))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let token = store.get_token(&first.id).await.unwrap().unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("r1"));
        assert_eq!(store.list_accounts("u1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_expiring_accounts_requires_refresh_token() {
        let store = MemoryStore::new();
        let with_refresh = store
            .connect_account(&new_account("u1", Some("r1"), 60))
            .await
            .unwrap();
        let mut no_refresh = new_account("u2", None, 60);
        no_refresh.subject = "other".into();
        store.connect_account(&no_refresh).await.unwrap();
        let mut fresh = new_account("u3", Some("r3"), 24 * 3600);
        fresh.subject = "fresh".into();
        store.connect_account(&fresh).await.unwrap();

        let expiring = store.expiring_accounts(10).await.unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].id, with_refresh.id);
    }

    #[tokio::test]
    async fn test_due_posts_only_scheduled_and_due() {
        let store = MemoryStore::new();
        let due = store.create_post(&new_post("u1", "acc", -60)).await.unwrap();
        store.create_post(&new_post("u1", "acc", 3600)).await.unwrap();
        let mut draft = new_post("u1", "acc", -60);
        draft.status = PostStatus::Draft;
        store.create_post(&draft).await.unwrap();

        let posts = store.due_posts(Utc::now(), 10).await.unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, due.id);
    }

    #[tokio::test]
    async fn test_published_post_is_immutable() {
        let store = MemoryStore::new();
        let post = store.create_post(&new_post("u1", "acc", -1)).await.unwrap();
        assert!(store.mark_published(&post.id, Utc::now()).await.unwrap());

        assert!(!store.mark_failed(&post.id, "late", Utc::now()).await.unwrap());
        let err = store
            .update_post("u1", &post.id, &PostUpdate::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let stored = store.get_post("u1", &post.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PostStatus::Published);
        assert!(stored.error_message.is_none());
    }

    #[tokio::test]
    async fn test_posts_are_scoped_to_owner() {
        let store = MemoryStore::new();
        let post = store.create_post(&new_post("u1", "acc", 0)).await.unwrap();
        assert!(store.get_post("u2", &post.id).await.unwrap().is_none());
        assert!(matches!(
            store.delete_post("u2", &post.id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
