use std::sync::Arc;
use tracing::info;

use super::refresher::TokenRefresher;
use super::uploader::MediaUploader;
use crate::error::AppError;
use crate::models::{Account, MediaFile};
use crate::providers::ProviderRegistry;

/// Publishes one post for one account: optional media upload, payload
/// construction, then the final authorized submit.
///
/// Errors from the refresher, the uploader and the provider are returned
/// unchanged.
pub struct PostPublisher {
    refresher: Arc<TokenRefresher>,
    uploader: Arc<MediaUploader>,
    registry: Arc<ProviderRegistry>,
    provider_id: String,
}

impl PostPublisher {
    pub fn new(
        refresher: Arc<TokenRefresher>,
        uploader: Arc<MediaUploader>,
        registry: Arc<ProviderRegistry>,
        provider_id: impl Into<String>,
    ) -> Self {
        Self {
            refresher,
            uploader,
            registry,
            provider_id: provider_id.into(),
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    pub async fn publish(
        &self,
        account: &Account,
        text: &str,
        media: Option<&MediaFile>,
    ) -> Result<serde_json::Value, AppError> {
        if account.provider != self.provider_id {
            return Err(AppError::UnsupportedAccount(format!(
                "expected a {} account, got {}",
                self.provider_id, account.provider
            )));
        }

        let adapter = self.registry.get(&self.provider_id).ok_or_else(|| {
            AppError::UnsupportedAccount(format!("provider {} is not configured", self.provider_id))
        })?;

        let author_urn = adapter.author_urn(&account.subject);

        let asset = match media {
            Some(file) => Some(self.uploader.upload(account, file, &author_urn).await?),
            None => None,
        };

        let body = adapter.post_body(&author_urn, text, asset.as_ref());

        // The upload may have run past the token's expiry; re-check
        let headers = self.refresher.headers(account).await?;
        let response = adapter.create_post(headers, &body).await?;

        info!(
            "Published {} post for account {} (media: {})",
            adapter.display_name(),
            account.id,
            asset.as_ref().map(|a| a.kind.as_str()).unwrap_or("none")
        );

        Ok(response)
    }
}
