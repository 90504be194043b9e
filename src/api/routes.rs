//! API route handlers for the social-scheduler service.
//!
//! Every route except `/status` is called by the front service and carries
//! the shared `x-internal-secret`. User-scoped routes name the acting user in
//! `x-user-id`; the front service has already authenticated them.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::json;

use crate::error::AppError;
use crate::models::{
    validate_content, Account, MediaKind, NewAccount, NewPost, PostStatus, PostUpdate,
};
use crate::SharedState;

// =============================================================================
// V1 Router
// =============================================================================

pub fn v1_router(state: SharedState) -> Router {
    Router::new()
        // ── Health ───────────────────────────────────────────────────────
        .route("/status", get(status))
        .route("/providers", get(providers))
        // ── Accounts ─────────────────────────────────────────────────────
        .route("/accounts", post(account_connect).get(account_list))
        // ── Posts ────────────────────────────────────────────────────────
        .route("/posts", post(post_create).get(post_list))
        .route(
            "/posts/{id}",
            get(post_get).patch(post_update).delete(post_delete),
        )
        .route("/posts/{id}/publish", post(post_publish))
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn status() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "social-scheduler",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /v1/providers: Registered provider ids.
async fn providers(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    require_internal(&state, &headers)?;
    Ok(Json(json!({ "data": state.registry.list() })))
}

// =============================================================================
// Auth
// =============================================================================

fn require_internal(state: &SharedState, headers: &HeaderMap) -> Result<(), AppError> {
    let internal = headers
        .get("x-internal-secret")
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;

    if internal != state.config.internal_api_secret {
        return Err(AppError::Unauthorized);
    }
    Ok(())
}

/// Internal auth plus the acting user's id.
fn require_user(state: &SharedState, headers: &HeaderMap) -> Result<String, AppError> {
    require_internal(state, headers)?;
    headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| AppError::BadRequest("x-user-id header is required".into()))
}

// =============================================================================
// Accounts
// =============================================================================

#[derive(Deserialize)]
struct ConnectAccountBody {
    provider: String,
    subject: String,
    display_name: String,
    email: Option<String>,
    profile_image_url: Option<String>,
    access_token: String,
    refresh_token: Option<String>,
    /// Seconds until the access token expires.
    expires_in: i64,
}

/// POST /v1/accounts: Store an account and token from a finished OAuth flow.
async fn account_connect(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<ConnectAccountBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let user_id = require_user(&state, &headers)?;

    if state.registry.get(&body.provider).is_none() {
        return Err(AppError::UnsupportedAccount(format!(
            "provider {} is not configured",
            body.provider
        )));
    }
    if body.subject.is_empty() || body.access_token.is_empty() {
        return Err(AppError::BadRequest(
            "subject and access_token are required".into(),
        ));
    }
    if body.expires_in <= 0 {
        return Err(AppError::BadRequest("expires_in must be positive".into()));
    }
    let expires_at = Duration::try_seconds(body.expires_in)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| AppError::BadRequest("expires_in out of range".into()))?;

    let account = state
        .stores
        .accounts
        .connect_account(&NewAccount {
            user_id,
            provider: body.provider,
            subject: body.subject,
            display_name: body.display_name,
            email: body.email,
            profile_image_url: body.profile_image_url,
            access_token: body.access_token,
            refresh_token: body.refresh_token.filter(|rt| !rt.is_empty()),
            expires_at,
        })
        .await?;

    tracing::info!("Connected {} account {}", account.provider, account.id);
    Ok((StatusCode::CREATED, Json(json!({ "data": account }))))
}

/// GET /v1/accounts: The user's connected accounts. Tokens are never returned.
async fn account_list(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = require_user(&state, &headers)?;
    let accounts = state.stores.accounts.list_accounts(&user_id).await?;
    Ok(Json(json!({ "data": accounts })))
}

/// Load an account owned by the user that the publisher can post for.
async fn publishable_account(
    state: &SharedState,
    user_id: &str,
    account_id: &str,
) -> Result<Account, AppError> {
    let account = state
        .stores
        .accounts
        .get_account(account_id)
        .await?
        .filter(|a| a.user_id == user_id)
        .ok_or_else(|| AppError::NotFound("account".into()))?;

    if account.provider != state.publisher.provider_id() {
        return Err(AppError::UnsupportedAccount(format!(
            "posts can only target {} accounts",
            state.publisher.provider_id()
        )));
    }
    Ok(account)
}

// =============================================================================
// Posts
// =============================================================================

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn nullable<'de, D, T>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

fn check_editable_status(status: PostStatus) -> Result<(), AppError> {
    match status {
        PostStatus::Draft | PostStatus::Scheduled => Ok(()),
        other => Err(AppError::BadRequest(format!(
            "status can only be set to DRAFT or SCHEDULED, not {}",
            other.as_str()
        ))),
    }
}

fn check_not_past(scheduled_time: DateTime<Utc>) -> Result<(), AppError> {
    if scheduled_time < Utc::now() {
        return Err(AppError::BadRequest(
            "scheduled_time must not be in the past".into(),
        ));
    }
    Ok(())
}

async fn check_media_path(path: &str) -> Result<(), AppError> {
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Ok(()),
        _ => Err(AppError::BadRequest(format!("media file {path} not found"))),
    }
}

#[derive(Deserialize)]
struct CreatePostBody {
    account_id: String,
    content: String,
    media_path: Option<String>,
    media_kind: Option<MediaKind>,
    status: Option<PostStatus>,
    scheduled_time: Option<DateTime<Utc>>,
}

/// POST /v1/posts: Create a draft or schedule a post.
///
/// Status defaults to SCHEDULED when a time is given and DRAFT otherwise.
async fn post_create(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(body): Json<CreatePostBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let user_id = require_user(&state, &headers)?;

    validate_content(&body.content)?;
    let status = body.status.unwrap_or(if body.scheduled_time.is_some() {
        PostStatus::Scheduled
    } else {
        PostStatus::Draft
    });
    check_editable_status(status)?;

    let scheduled_time = match (status, body.scheduled_time) {
        (PostStatus::Scheduled, None) => {
            return Err(AppError::BadRequest(
                "scheduled_time is required for scheduled posts".into(),
            ))
        }
        (PostStatus::Scheduled, Some(at)) => {
            check_not_past(at)?;
            at
        }
        (_, at) => at.unwrap_or_else(Utc::now),
    };

    if let Some(path) = &body.media_path {
        check_media_path(path).await?;
    }
    let account = publishable_account(&state, &user_id, &body.account_id).await?;

    let post = state
        .stores
        .posts
        .create_post(&NewPost {
            user_id,
            account_id: account.id,
            content: body.content,
            media_path: body.media_path,
            media_kind: body.media_kind,
            status,
            scheduled_time,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(json!({ "data": post }))))
}

/// GET /v1/posts: The user's posts, newest scheduled time first.
async fn post_list(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = require_user(&state, &headers)?;
    let posts = state.stores.posts.list_posts(&user_id).await?;
    Ok(Json(json!({ "data": posts })))
}

async fn post_get(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = require_user(&state, &headers)?;
    let post = state
        .stores
        .posts
        .get_post(&user_id, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("post".into()))?;
    Ok(Json(json!({ "data": post })))
}

#[derive(Deserialize)]
struct UpdatePostBody {
    content: Option<String>,
    #[serde(default, deserialize_with = "nullable")]
    media_path: Option<Option<String>>,
    #[serde(default, deserialize_with = "nullable")]
    media_kind: Option<Option<MediaKind>>,
    status: Option<PostStatus>,
    scheduled_time: Option<DateTime<Utc>>,
}

/// PATCH /v1/posts/:id: Edit an unpublished post.
async fn post_update(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(body): Json<UpdatePostBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = require_user(&state, &headers)?;

    let existing = state
        .stores
        .posts
        .get_post(&user_id, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("post".into()))?;
    if existing.status == PostStatus::Published {
        return Err(AppError::Conflict("published posts cannot be edited".into()));
    }

    if let Some(content) = &body.content {
        validate_content(content)?;
    }
    if let Some(status) = body.status {
        check_editable_status(status)?;
    }
    if let Some(at) = body.scheduled_time {
        check_not_past(at)?;
    }
    // Entering SCHEDULED needs a time that has not passed yet
    if body.status == Some(PostStatus::Scheduled) && existing.status != PostStatus::Scheduled {
        let at = body.scheduled_time.unwrap_or(existing.scheduled_time);
        if at < Utc::now() {
            return Err(AppError::BadRequest(
                "scheduled_time is required when scheduling a post".into(),
            ));
        }
    }
    if let Some(Some(path)) = &body.media_path {
        check_media_path(path).await?;
    }

    let update = PostUpdate {
        content: body.content,
        media_path: body.media_path,
        media_kind: body.media_kind,
        status: body.status,
        scheduled_time: body.scheduled_time,
    };
    let post = state.stores.posts.update_post(&user_id, &id, &update).await?;

    Ok(Json(json!({ "data": post })))
}

/// DELETE /v1/posts/:id: Remove a post from the queue. Nothing is deleted
/// on the provider side.
async fn post_delete(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = require_user(&state, &headers)?;
    state.stores.posts.delete_post(&user_id, &id).await?;
    Ok(Json(json!({ "data": { "success": true } })))
}

/// POST /v1/posts/:id/publish: Publish now and record the outcome.
///
/// A provider failure is not an HTTP error here; it is returned as a FAILED
/// outcome, exactly as the scheduler would record it.
async fn post_publish(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user_id = require_user(&state, &headers)?;
    let post = state
        .stores
        .posts
        .get_post(&user_id, &id)
        .await?
        .ok_or_else(|| AppError::NotFound("post".into()))?;

    let outcome = state.scheduler.run_post(&post).await?;
    Ok(Json(json!({ "data": outcome })))
}
