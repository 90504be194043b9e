//! Domain records shared by the stores, the publishing workflow and the API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// LinkedIn's limit on share commentary length.
pub const MAX_POST_CHARS: usize = 3000;

/// A connected third-party profile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: String,
    pub user_id: String,
    /// Provider identifier (e.g. "linkedin").
    pub provider: String,
    /// Provider-assigned subject id (the OIDC `sub` claim).
    pub subject: String,
    pub display_name: String,
    pub email: Option<String>,
    pub profile_image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The single live OAuth token record for an account.
#[derive(Clone, PartialEq)]
pub struct Token {
    pub account_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl Token {
    /// Refresh token, treating an empty string as absent.
    pub fn usable_refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|rt| !rt.is_empty())
    }
}

// Token values stay out of logs.
impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("account_id", &self.account_id)
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.usable_refresh_token().is_some())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostStatus {
    Draft,
    Scheduled,
    Published,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "DRAFT",
            PostStatus::Scheduled => "SCHEDULED",
            PostStatus::Published => "PUBLISHED",
            PostStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(PostStatus::Draft),
            "SCHEDULED" => Some(PostStatus::Scheduled),
            "PUBLISHED" => Some(PostStatus::Published),
            "FAILED" => Some(PostStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }

    /// `video/*` is a video, anything else is uploaded as an image.
    pub fn from_content_type(content_type: &str) -> Self {
        if content_type.starts_with("video/") {
            MediaKind::Video
        } else {
            MediaKind::Image
        }
    }
}

/// Local media attached to a publish call.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub path: String,
    /// `None` infers the kind from the file's content type.
    pub kind: Option<MediaKind>,
}

/// Provider-issued handle for uploaded media. Lives for one publish attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaAsset {
    pub handle: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledPost {
    pub id: String,
    pub user_id: String,
    pub account_id: String,
    pub content: String,
    pub media_path: Option<String>,
    pub media_kind: Option<MediaKind>,
    pub status: PostStatus,
    pub scheduled_time: DateTime<Utc>,
    pub published_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduledPost {
    pub fn media(&self) -> Option<MediaFile> {
        self.media_path.as_ref().map(|path| MediaFile {
            path: path.clone(),
            kind: self.media_kind,
        })
    }
}

// ── Inputs ───────────────────────────────────────────────────────────────────

/// Account + initial token handed over by the OAuth callback flow.
#[derive(Debug)]
pub struct NewAccount {
    pub user_id: String,
    pub provider: String,
    pub subject: String,
    pub display_name: String,
    pub email: Option<String>,
    pub profile_image_url: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: String,
    pub account_id: String,
    pub content: String,
    pub media_path: Option<String>,
    pub media_kind: Option<MediaKind>,
    pub status: PostStatus,
    pub scheduled_time: DateTime<Utc>,
}

/// Partial edit of a post. `None` leaves the field untouched; the nested
/// `Option` on media clears it when `Some(None)`.
#[derive(Debug, Clone, Default)]
pub struct PostUpdate {
    pub content: Option<String>,
    pub media_path: Option<Option<String>>,
    pub media_kind: Option<Option<MediaKind>>,
    pub status: Option<PostStatus>,
    pub scheduled_time: Option<DateTime<Utc>>,
}

impl PostUpdate {
    /// Apply the edit in place. Published posts never reach this.
    pub fn apply(&self, post: &mut ScheduledPost, now: DateTime<Utc>) {
        if let Some(content) = &self.content {
            post.content = content.clone();
        }
        if let Some(media_path) = &self.media_path {
            post.media_path = media_path.clone();
        }
        if let Some(media_kind) = self.media_kind {
            post.media_kind = media_kind;
        }
        if let Some(status) = self.status {
            post.status = status;
            post.error_message = None;
        }
        if let Some(scheduled_time) = self.scheduled_time {
            post.scheduled_time = scheduled_time;
        }
        post.updated_at = now;
    }
}

/// Validate post text against the provider's commentary rules.
pub fn validate_content(content: &str) -> Result<(), crate::error::AppError> {
    if content.trim().is_empty() {
        return Err(crate::error::AppError::BadRequest(
            "post content must not be empty".into(),
        ));
    }
    if content.chars().count() > MAX_POST_CHARS {
        return Err(crate::error::AppError::BadRequest(format!(
            "post content exceeds {MAX_POST_CHARS} characters"
        )));
    }
    Ok(())
}
