use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::AppError;
use crate::models::{MediaAsset, MediaKind};

/// A set of tokens returned from a provider's refresh endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
}

/// Single-use upload target issued by a media registration.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadTicket {
    pub upload_url: String,
    pub asset: String,
}

/// Trait that every publishing provider must implement.
///
/// Each implementation owns its wire format: how calls are authorized, how
/// tokens are refreshed, how media is registered and transferred, and how a
/// post payload is shaped and submitted. Callers in `publish` never see a
/// provider-specific field name.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Unique provider identifier (e.g., "linkedin"), matched against `Account::provider`.
    fn id(&self) -> &str;

    /// Human-readable display name.
    fn display_name(&self) -> &str;

    /// Author identity for an account's provider subject id.
    fn author_urn(&self, subject: &str) -> String;

    /// Headers sent on every authorized API call.
    fn auth_headers(&self, access_token: &str) -> Result<HeaderMap, AppError>;

    /// Exchange a refresh token for a new access token.
    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, AppError>;

    /// Declare an upload and receive its target URL and asset handle.
    async fn register_upload(
        &self,
        headers: HeaderMap,
        author_urn: &str,
        kind: MediaKind,
    ) -> Result<UploadTicket, AppError>;

    /// Send the media bytes to the ticket's upload URL.
    async fn transfer_media(
        &self,
        ticket: &UploadTicket,
        body: reqwest::Body,
        content_type: &str,
    ) -> Result<(), AppError>;

    /// Build the publish payload.
    fn post_body(&self, author_urn: &str, text: &str, media: Option<&MediaAsset>)
        -> serde_json::Value;

    /// Submit a payload from `post_body`; returns the provider's response body.
    async fn create_post(
        &self,
        headers: HeaderMap,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, AppError>;

    /// Token lifetime assumed when a refresh response omits `expires_in`.
    fn token_ttl(&self) -> Duration {
        Duration::from_secs(3600) // 1 hour default
    }
}
