use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::traits::{ProviderAdapter, TokenSet, UploadTicket};
use crate::error::AppError;
use crate::models::{MediaAsset, MediaKind};

const UPLOAD_MECHANISM: &str = "com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest";
const RESTLI_PROTOCOL_VERSION: &str = "2.0.0";

/// Connection settings for the LinkedIn API.
#[derive(Debug, Clone)]
pub struct LinkedInConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Pinned `LinkedIn-Version` header (YYYYMM).
    pub api_version: String,
    pub oauth_base_url: String,
    pub api_base_url: String,
    pub http_timeout: Duration,
}

/// LinkedIn publishing provider (Share on LinkedIn, UGC posts API).
///
/// Quirks:
/// - Accounts come from Sign In with LinkedIn (OIDC); the `sub` claim is the
///   person id, so authors are `urn:li:person:<sub>`.
/// - Access tokens expire in 60 days. Refresh tokens need partner approval,
///   so many accounts have none and must reconnect.
/// - Media is a two-step upload: register, then PUT to a one-time URL.
/// - `ugcPosts` answers 201 and nothing else counts as success.
pub struct LinkedInProvider {
    config: LinkedInConfig,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct LinkedInTokenResponse {
    access_token: String,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
}

impl LinkedInProvider {
    pub fn new(config: LinkedInConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { config, http })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    fn recipe(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Image => "urn:li:digitalmediaRecipe:feedshare-image",
            MediaKind::Video => "urn:li:digitalmediaRecipe:feedshare-video",
        }
    }

    fn share_media_category(kind: MediaKind) -> &'static str {
        match kind {
            MediaKind::Image => "IMAGE",
            MediaKind::Video => "VIDEO",
        }
    }
}

/// Read a failed response into a provider error.
async fn provider_error(resp: reqwest::Response) -> AppError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    AppError::provider(status, body)
}

#[async_trait]
impl ProviderAdapter for LinkedInProvider {
    fn id(&self) -> &str {
        "linkedin"
    }

    fn display_name(&self) -> &str {
        "LinkedIn"
    }

    fn author_urn(&self, subject: &str) -> String {
        format!("urn:li:person:{subject}")
    }

    fn auth_headers(&self, access_token: &str) -> Result<HeaderMap, AppError> {
        let bearer = HeaderValue::from_str(&format!("Bearer {access_token}"))
            .map_err(|_| AppError::Internal("access token is not a valid header value".into()))?;
        let version = HeaderValue::from_str(&self.config.api_version)
            .map_err(|_| AppError::Internal("invalid LINKEDIN_API_VERSION".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(
            "x-restli-protocol-version",
            HeaderValue::from_static(RESTLI_PROTOCOL_VERSION),
        );
        headers.insert("linkedin-version", version);
        Ok(headers)
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenSet, AppError> {
        let resp = self
            .http
            .post(format!(
                "{}/accessToken",
                self.config.oauth_base_url.trim_end_matches('/')
            ))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::provider_unreachable(format!("Refresh request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(provider_error(resp).await);
        }

        let status = resp.status().as_u16();
        let token_resp: LinkedInTokenResponse = resp.json().await.map_err(|e| {
            AppError::provider(status, format!("Failed to parse refresh response: {e}"))
        })?;

        Ok(TokenSet {
            access_token: token_resp.access_token,
            refresh_token: token_resp.refresh_token.filter(|rt| !rt.is_empty()),
            expires_in: token_resp.expires_in,
        })
    }

    async fn register_upload(
        &self,
        headers: HeaderMap,
        author_urn: &str,
        kind: MediaKind,
    ) -> Result<UploadTicket, AppError> {
        let payload = json!({
            "registerUploadRequest": {
                "recipes": [Self::recipe(kind)],
                "owner": author_urn,
                "serviceRelationships": [{
                    "relationshipType": "OWNER",
                    "identifier": "urn:li:userGeneratedContent"
                }]
            }
        });

        let resp = self
            .http
            .post(self.api_url("assets"))
            .query(&[("action", "registerUpload")])
            .headers(headers)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                AppError::provider_unreachable(format!("Upload registration request failed: {e}"))
            })?;

        if !resp.status().is_success() {
            return Err(provider_error(resp).await);
        }

        let status = resp.status().as_u16();
        let body: serde_json::Value = resp.json().await.map_err(|e| {
            AppError::provider(status, format!("Failed to parse registration response: {e}"))
        })?;

        let value = &body["value"];
        let upload_url = value["uploadMechanism"][UPLOAD_MECHANISM]["uploadUrl"]
            .as_str()
            .ok_or_else(|| AppError::provider(status, "registration response missing uploadUrl"))?;
        let asset = value["asset"]
            .as_str()
            .ok_or_else(|| AppError::provider(status, "registration response missing asset"))?;

        url::Url::parse(upload_url).map_err(|e| {
            AppError::provider(status, format!("registration returned invalid uploadUrl: {e}"))
        })?;

        Ok(UploadTicket {
            upload_url: upload_url.to_string(),
            asset: asset.to_string(),
        })
    }

    async fn transfer_media(
        &self,
        ticket: &UploadTicket,
        body: reqwest::Body,
        content_type: &str,
    ) -> Result<(), AppError> {
        let resp = self
            .http
            .put(&ticket.upload_url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .map_err(|e| AppError::provider_unreachable(format!("Media upload failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(provider_error(resp).await);
        }

        Ok(())
    }

    fn post_body(
        &self,
        author_urn: &str,
        text: &str,
        media: Option<&MediaAsset>,
    ) -> serde_json::Value {
        let mut share_content = json!({
            "shareCommentary": { "text": text },
        });

        match media {
            Some(asset) => {
                share_content["shareMediaCategory"] = json!(Self::share_media_category(asset.kind));
                share_content["media"] = json!([{ "status": "READY", "media": asset.handle }]);
            }
            None => {
                share_content["shareMediaCategory"] = json!("NONE");
            }
        }

        json!({
            "author": author_urn,
            "lifecycleState": "PUBLISHED",
            "specificContent": {
                "com.linkedin.ugc.ShareContent": share_content,
            },
            "visibility": { "com.linkedin.ugc.MemberNetworkVisibility": "PUBLIC" }
        })
    }

    async fn create_post(
        &self,
        headers: HeaderMap,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, AppError> {
        let resp = self
            .http
            .post(self.api_url("ugcPosts"))
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::provider_unreachable(format!("Post request failed: {e}")))?;

        if resp.status() != StatusCode::CREATED {
            return Err(provider_error(resp).await);
        }

        // The post URN is also returned in `x-restli-id` when the body is empty
        let restli_id = resp
            .headers()
            .get("x-restli-id")
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        let text = resp
            .text()
            .await
            .map_err(|e| AppError::provider(201, format!("Failed to read post response: {e}")))?;

        if text.trim().is_empty() {
            return Ok(restli_id
                .map(|id| json!({ "id": id }))
                .unwrap_or(serde_json::Value::Null));
        }

        serde_json::from_str(&text)
            .map_err(|e| AppError::provider(201, format!("Failed to parse post response: {e}")))
    }

    fn token_ttl(&self) -> Duration {
        Duration::from_secs(60 * 24 * 3600) // LinkedIn tokens expire in 60 days
    }
}
