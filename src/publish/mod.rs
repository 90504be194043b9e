//! The publishing workflow: token refresh, media upload, post submission.

pub mod publisher;
pub mod refresher;
pub mod uploader;

pub use publisher::PostPublisher;
pub use refresher::{TokenRefresher, REFRESH_SKEW_SECS};
pub use uploader::{detect_content_type, MediaUploader};
