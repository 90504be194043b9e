//! PostgreSQL-backed store. Tables:
//! - `social_accounts`: connected provider profiles per user
//! - `social_tokens`: one encrypted OAuth token row per account
//! - `scheduled_posts`: the publishing queue

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::{AccountStore, ScheduleStore, TokenStore};
use crate::crypto::CryptoEngine;
use crate::error::AppError;
use crate::models::{
    Account, MediaKind, NewAccount, NewPost, PostStatus, PostUpdate, ScheduledPost, Token,
};

const POST_COLUMNS: &str = "id::text, user_id, account_id::text, content, media_path, media_kind, \
     status, scheduled_time, published_at, error_message, created_at, updated_at";

const ACCOUNT_COLUMNS: &str =
    "id::text, user_id, provider, subject, display_name, email, profile_image_url, created_at";

/// Ids that are not UUIDs cannot match any row.
fn is_uuid(id: &str) -> bool {
    Uuid::parse_str(id).is_ok()
}

/// Store backed by PostgreSQL. Token values are sealed to their account.
pub struct PgStore {
    pool: PgPool,
    crypto: CryptoEngine,
}

impl PgStore {
    pub async fn new(db_url: &str, crypto: CryptoEngine) -> Result<Self, AppError> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(20)
            .connect(db_url)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to PostgreSQL: {e}")))?;

        Ok(Self { pool, crypto })
    }

    /// Run schema migrations.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS social_accounts (
                id                 UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id            TEXT NOT NULL,
                provider           TEXT NOT NULL,
                subject            TEXT NOT NULL,
                display_name       TEXT NOT NULL DEFAULT '',
                email              TEXT,
                profile_image_url  TEXT,
                created_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at         TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                UNIQUE(user_id, provider, subject)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS social_tokens (
                account_id     UUID PRIMARY KEY REFERENCES social_accounts(id) ON DELETE CASCADE,
                access_token   TEXT NOT NULL,
                refresh_token  TEXT,
                expires_at     TIMESTAMPTZ NOT NULL,
                updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS scheduled_posts (
                id              UUID PRIMARY KEY DEFAULT gen_random_uuid(),
                user_id         TEXT NOT NULL,
                account_id      UUID NOT NULL REFERENCES social_accounts(id) ON DELETE CASCADE,
                content         TEXT NOT NULL,
                media_path      TEXT,
                media_kind      TEXT,
                status          TEXT NOT NULL DEFAULT 'DRAFT',
                scheduled_time  TIMESTAMPTZ NOT NULL,
                published_at    TIMESTAMPTZ,
                error_message   TEXT,
                created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scheduled_posts_due ON scheduled_posts(scheduled_time) WHERE status = 'SCHEDULED'"
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_scheduled_posts_user ON scheduled_posts(user_id, scheduled_time DESC)"
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_social_tokens_expiry ON social_tokens(expires_at) WHERE refresh_token IS NOT NULL"
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn post_from_row(row: &PgRow) -> Result<ScheduledPost, AppError> {
        let status: String = row.get(6);
        let media_kind: Option<String> = row.get(5);
        Ok(ScheduledPost {
            id: row.get(0),
            user_id: row.get(1),
            account_id: row.get(2),
            content: row.get(3),
            media_path: row.get(4),
            media_kind: media_kind.as_deref().and_then(MediaKind::parse),
            status: PostStatus::parse(&status)
                .ok_or_else(|| AppError::Database(format!("unknown post status {status}")))?,
            scheduled_time: row.get(7),
            published_at: row.get(8),
            error_message: row.get(9),
            created_at: row.get(10),
            updated_at: row.get(11),
        })
    }

    fn account_from_row(row: &PgRow) -> Account {
        Account {
            id: row.get(0),
            user_id: row.get(1),
            provider: row.get(2),
            subject: row.get(3),
            display_name: row.get(4),
            email: row.get(5),
            profile_image_url: row.get(6),
            created_at: row.get(7),
        }
    }
}

#[async_trait]
impl TokenStore for PgStore {
    async fn get_token(&self, account_id: &str) -> Result<Option<Token>, AppError> {
        if !is_uuid(account_id) {
            return Ok(None);
        }
        let row = sqlx::query(
            r#"
            SELECT account_id::text, access_token, refresh_token, expires_at
            FROM social_tokens
            WHERE account_id = $1::uuid
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        let row = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        // Sealed under the canonical id text, not the caller's spelling of it
        let owner: String = row.get(0);
        let enc_access: String = row.get(1);
        let enc_refresh: Option<String> = row.get(2);

        let refresh_token = match enc_refresh {
            Some(ref rt) if !rt.is_empty() => Some(self.crypto.open(&owner, rt)?),
            _ => None,
        };

        Ok(Some(Token {
            access_token: self.crypto.open(&owner, &enc_access)?,
            account_id: owner,
            refresh_token,
            expires_at: row.get(3),
        }))
    }

    async fn update_token(&self, token: &Token) -> Result<(), AppError> {
        let enc_access = self.crypto.seal(&token.account_id, &token.access_token)?;
        let enc_refresh = self
            .crypto
            .seal_opt(&token.account_id, token.refresh_token.as_deref())?;

        let affected = sqlx::query(
            r#"
            UPDATE social_tokens
            SET access_token = $1,
                refresh_token = $2,
                expires_at = $3,
                updated_at = NOW()
            WHERE account_id = $4::uuid
            "#,
        )
        .bind(&enc_access)
        .bind(&enc_refresh)
        .bind(token.expires_at)
        .bind(&token.account_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound("token".into()));
        }

        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn connect_account(&self, new: &NewAccount) -> Result<Account, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO social_accounts
                (user_id, provider, subject, display_name, email, profile_image_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (user_id, provider, subject)
            DO UPDATE SET
                display_name = EXCLUDED.display_name,
                email = EXCLUDED.email,
                profile_image_url = EXCLUDED.profile_image_url,
                updated_at = NOW()
            RETURNING {ACCOUNT_COLUMNS}
            "#
        ))
        .bind(&new.user_id)
        .bind(&new.provider)
        .bind(&new.subject)
        .bind(&new.display_name)
        .bind(&new.email)
        .bind(&new.profile_image_url)
        .fetch_one(&mut *tx)
        .await?;

        let account = Self::account_from_row(&row);
        let enc_access = self.crypto.seal(&account.id, &new.access_token)?;
        let enc_refresh = self
            .crypto
            .seal_opt(&account.id, new.refresh_token.as_deref())?;

        sqlx::query(
            r#"
            INSERT INTO social_tokens (account_id, access_token, refresh_token, expires_at)
            VALUES ($1::uuid, $2, $3, $4)
            ON CONFLICT (account_id)
            DO UPDATE SET
                access_token = EXCLUDED.access_token,
                refresh_token = COALESCE(EXCLUDED.refresh_token, social_tokens.refresh_token),
                expires_at = EXCLUDED.expires_at,
                updated_at = NOW()
            "#,
        )
        .bind(&account.id)
        .bind(&enc_access)
        .bind(&enc_refresh)
        .bind(new.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(account)
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<Account>, AppError> {
        if !is_uuid(account_id) {
            return Ok(None);
        }
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM social_accounts WHERE id = $1::uuid"
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::account_from_row))
    }

    async fn list_accounts(&self, user_id: &str) -> Result<Vec<Account>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM social_accounts WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::account_from_row).collect())
    }

    async fn expiring_accounts(&self, within_minutes: i64) -> Result<Vec<Account>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT a.id::text, a.user_id, a.provider, a.subject, a.display_name,
                   a.email, a.profile_image_url, a.created_at
            FROM social_accounts a
            JOIN social_tokens t ON t.account_id = a.id
            WHERE t.expires_at < NOW() + ($1 || ' minutes')::interval
              AND t.refresh_token IS NOT NULL
            "#,
        )
        .bind(within_minutes.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::account_from_row).collect())
    }
}

#[async_trait]
impl ScheduleStore for PgStore {
    async fn create_post(&self, new: &NewPost) -> Result<ScheduledPost, AppError> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO scheduled_posts
                (user_id, account_id, content, media_path, media_kind, status, scheduled_time)
            VALUES ($1, $2::uuid, $3, $4, $5, $6, $7)
            RETURNING {POST_COLUMNS}
            "#
        ))
        .bind(&new.user_id)
        .bind(&new.account_id)
        .bind(&new.content)
        .bind(&new.media_path)
        .bind(new.media_kind.map(|k| k.as_str()))
        .bind(new.status.as_str())
        .bind(new.scheduled_time)
        .fetch_one(&self.pool)
        .await?;

        Self::post_from_row(&row)
    }

    async fn get_post(
        &self,
        user_id: &str,
        post_id: &str,
    ) -> Result<Option<ScheduledPost>, AppError> {
        if !is_uuid(post_id) {
            return Ok(None);
        }
        let row = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM scheduled_posts WHERE id = $1::uuid AND user_id = $2"
        ))
        .bind(post_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::post_from_row).transpose()
    }

    async fn list_posts(&self, user_id: &str) -> Result<Vec<ScheduledPost>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM scheduled_posts WHERE user_id = $1 ORDER BY scheduled_time DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::post_from_row).collect()
    }

    async fn update_post(
        &self,
        user_id: &str,
        post_id: &str,
        update: &PostUpdate,
    ) -> Result<ScheduledPost, AppError> {
        if !is_uuid(post_id) {
            return Err(AppError::NotFound("post".into()));
        }
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            "SELECT {POST_COLUMNS} FROM scheduled_posts WHERE id = $1::uuid AND user_id = $2 FOR UPDATE"
        ))
        .bind(post_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("post".into()))?;

        let mut post = Self::post_from_row(&row)?;
        if post.status == PostStatus::Published {
            return Err(AppError::Conflict("published posts cannot be edited".into()));
        }

        update.apply(&mut post, Utc::now());

        sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET content = $1,
                media_path = $2,
                media_kind = $3,
                status = $4,
                scheduled_time = $5,
                error_message = $6,
                updated_at = $7
            WHERE id = $8::uuid
            "#,
        )
        .bind(&post.content)
        .bind(&post.media_path)
        .bind(post.media_kind.map(|k| k.as_str()))
        .bind(post.status.as_str())
        .bind(post.scheduled_time)
        .bind(&post.error_message)
        .bind(post.updated_at)
        .bind(post_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(post)
    }

    async fn delete_post(&self, user_id: &str, post_id: &str) -> Result<(), AppError> {
        if !is_uuid(post_id) {
            return Err(AppError::NotFound("post".into()));
        }
        let affected = sqlx::query(
            "DELETE FROM scheduled_posts WHERE id = $1::uuid AND user_id = $2",
        )
        .bind(post_id)
        .bind(user_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(AppError::NotFound("post".into()));
        }

        Ok(())
    }

    async fn due_posts(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<ScheduledPost>, AppError> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM scheduled_posts
            WHERE status = 'SCHEDULED' AND scheduled_time <= $1
            ORDER BY scheduled_time ASC
            LIMIT $2
            "#
        ))
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::post_from_row).collect()
    }

    async fn mark_published(&self, post_id: &str, at: DateTime<Utc>) -> Result<bool, AppError> {
        let affected = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = 'PUBLISHED',
                published_at = $1,
                error_message = NULL,
                updated_at = $1
            WHERE id = $2::uuid AND status <> 'PUBLISHED'
            "#,
        )
        .bind(at)
        .bind(post_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected > 0)
    }

    async fn mark_failed(
        &self,
        post_id: &str,
        message: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let affected = sqlx::query(
            r#"
            UPDATE scheduled_posts
            SET status = 'FAILED',
                error_message = $1,
                updated_at = $2
            WHERE id = $3::uuid AND status <> 'PUBLISHED'
            "#,
        )
        .bind(message)
        .bind(at)
        .bind(post_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(affected > 0)
    }
}
