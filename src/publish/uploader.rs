//! Two-phase media upload: register with the provider, then stream the file.

use std::sync::Arc;
use tokio_util::io::ReaderStream;
use tracing::info;

use super::refresher::TokenRefresher;
use crate::error::AppError;
use crate::models::{Account, MediaAsset, MediaFile, MediaKind};
use crate::providers::{ProviderAdapter, ProviderRegistry};

const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Uploads local media and returns the provider's asset handle.
///
/// Nothing is retried here. A retry by the caller registers a brand-new
/// upload, so a failed transfer can leave an orphaned registration behind.
pub struct MediaUploader {
    refresher: Arc<TokenRefresher>,
    registry: Arc<ProviderRegistry>,
}

/// Content type guessed from the file extension.
pub fn detect_content_type(path: &str) -> String {
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or(FALLBACK_CONTENT_TYPE)
        .to_string()
}

impl MediaUploader {
    pub fn new(refresher: Arc<TokenRefresher>, registry: Arc<ProviderRegistry>) -> Self {
        Self {
            refresher,
            registry,
        }
    }

    fn adapter(&self, account: &Account) -> Result<Arc<dyn ProviderAdapter>, AppError> {
        self.registry.get(&account.provider).ok_or_else(|| {
            AppError::UnsupportedAccount(format!("no provider registered for {}", account.provider))
        })
    }

    pub async fn upload(
        &self,
        account: &Account,
        media: &MediaFile,
        author_urn: &str,
    ) -> Result<MediaAsset, AppError> {
        let adapter = self.adapter(account)?;

        let file = tokio::fs::File::open(&media.path)
            .await
            .map_err(|e| AppError::Media(format!("cannot open {}: {e}", media.path)))?;
        let metadata = file
            .metadata()
            .await
            .map_err(|e| AppError::Media(format!("cannot stat {}: {e}", media.path)))?;
        if !metadata.is_file() {
            return Err(AppError::Media(format!("{} is not a regular file", media.path)));
        }

        let content_type = detect_content_type(&media.path);
        let kind = media
            .kind
            .unwrap_or_else(|| MediaKind::from_content_type(&content_type));

        // Step 1: register
        let headers = self.refresher.headers(account).await?;
        let ticket = adapter.register_upload(headers, author_urn, kind).await?;

        // Step 2: transfer
        let body = reqwest::Body::wrap_stream(ReaderStream::new(file));
        adapter.transfer_media(&ticket, body, &content_type).await?;

        info!(
            "Uploaded {} ({} bytes, {}) for account {} as {}",
            kind.as_str(),
            metadata.len(),
            content_type,
            account.id,
            ticket.asset
        );

        Ok(MediaAsset {
            handle: ticket.asset,
            kind,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_support::{connect, linkedin_registry};
    use serde_json::json;
    use std::io::Write;
    use wiremock::matchers::{body_bytes, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mount_register(server: &MockServer, recipe: &str) {
        Mock::given(method("POST"))
            .and(path("/v2/assets"))
            .and(wiremock::matchers::body_partial_json(json!({
                "registerUploadRequest": { "recipes": [recipe] }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": {
                    "uploadMechanism": {
                        "com.linkedin.digitalmedia.uploading.MediaUploadHttpRequest": {
                            "uploadUrl": format!("{}/upload/abc", server.uri())
                        }
                    },
                    "asset": "urn:li:digitalmediaAsset:C5612"
                }
            })))
            .expect(1)
            .mount(server)
            .await;
    }

    fn uploader(store: &Arc<MemoryStore>, server: &MockServer) -> MediaUploader {
        let registry = linkedin_registry(server);
        let refresher = Arc::new(TokenRefresher::new(store.clone(), registry.clone()));
        MediaUploader::new(refresher, registry)
    }

    fn temp_media(suffix: &str, bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_detect_content_type() {
        assert_eq!(detect_content_type("/tmp/photo.png"), "image/png");
        assert_eq!(detect_content_type("/tmp/clip.mp4"), "video/mp4");
        assert_eq!(detect_content_type("/tmp/blob"), FALLBACK_CONTENT_TYPE);
    }

    #[tokio::test]
    async fn test_upload_registers_then_streams_file() {
        let server = MockServer::start().await;
        mount_register(&server, "urn:li:digitalmediaRecipe:feedshare-image").await;
        Mock::given(method("PUT"))
            .and(path("/upload/abc"))
            .and(header("content-type", "image/png"))
            .and(body_bytes(b"\x89PNG-fake".to_vec()))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let account = connect(&store, "a1", Some("r1"), 3600).await;
        let file = temp_media(".png", b"\x89PNG-fake");
        let media = MediaFile {
            path: file.path().to_string_lossy().into_owned(),
            kind: None,
        };

        let asset = uploader(&store, &server)
            .upload(&account, &media, "urn:li:person:abc123")
            .await
            .unwrap();

        assert_eq!(asset.handle, "urn:li:digitalmediaAsset:C5612");
        assert_eq!(asset.kind, MediaKind::Image);
    }

    #[tokio::test]
    async fn test_video_is_inferred_from_content_type() {
        let server = MockServer::start().await;
        mount_register(&server, "urn:li:digitalmediaRecipe:feedshare-video").await;
        Mock::given(method("PUT"))
            .and(path("/upload/abc"))
            .and(header("content-type", "video/mp4"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let account = connect(&store, "a1", Some("r1"), 3600).await;
        let file = temp_media(".mp4", b"ftyp");
        let media = MediaFile {
            path: file.path().to_string_lossy().into_owned(),
            kind: None,
        };

        let asset = uploader(&store, &server)
            .upload(&account, &media, "urn:li:person:abc123")
            .await
            .unwrap();
        assert_eq!(asset.kind, MediaKind::Video);
    }

    #[tokio::test]
    async fn test_transfer_failure_is_provider_error() {
        let server = MockServer::start().await;
        mount_register(&server, "urn:li:digitalmediaRecipe:feedshare-image").await;
        Mock::given(method("PUT"))
            .and(path("/upload/abc"))
            .respond_with(ResponseTemplate::new(500).set_body_string("storage unavailable"))
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let account = connect(&store, "a1", Some("r1"), 3600).await;
        let file = temp_media(".jpg", b"jpeg");
        let media = MediaFile {
            path: file.path().to_string_lossy().into_owned(),
            kind: Some(MediaKind::Image),
        };

        let err = uploader(&store, &server)
            .upload(&account, &media, "urn:li:person:abc123")
            .await
            .unwrap_err();
        match err {
            AppError::ProviderApi { status, body } => {
                assert_eq!(status, Some(500));
                assert_eq!(body, "storage unavailable");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_registration_failure_skips_transfer() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/assets"))
            .respond_with(ResponseTemplate::new(403).set_body_string("ACCESS_DENIED"))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let account = connect(&store, "a1", Some("r1"), 3600).await;
        let file = temp_media(".png", b"png");
        let media = MediaFile {
            path: file.path().to_string_lossy().into_owned(),
            kind: None,
        };

        let err = uploader(&store, &server)
            .upload(&account, &media, "urn:li:person:abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ProviderApi { status: Some(403), .. }));
    }

    #[tokio::test]
    async fn test_missing_file_fails_before_registration() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let store = Arc::new(MemoryStore::new());
        let account = connect(&store, "a1", Some("r1"), 3600).await;
        let media = MediaFile {
            path: "/nonexistent/photo.png".into(),
            kind: None,
        };

        let err = uploader(&store, &server)
            .upload(&account, &media, "urn:li:person:abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Media(_)));
    }
}
