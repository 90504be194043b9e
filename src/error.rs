use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Unified error type for the social-scheduler service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // ── Publishing Errors ───────────────────────────────────────────────
    /// No usable refresh credential; the user must reconnect the account.
    #[error("Account not connected: {0}")]
    AccountNotConnected(String),

    /// Any non-success outcome from a provider call. `status` is `None` when
    /// no usable HTTP response was received (transport failure, deadline).
    /// A token lifetime that does not fit a timestamp also lands here.
    #[error("Provider API error{}: {body}", fmt_status(.status))]
    ProviderApi { status: Option<u16>, body: String },

    #[error("Unsupported account: {0}")]
    UnsupportedAccount(String),

    #[error("Media error: {0}")]
    Media(String),

    // ── Request Errors ──────────────────────────────────────────────────
    #[error("Authentication required")]
    Unauthorized,

    #[error("{0} not found")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    // ── Internal ────────────────────────────────────────────────────────
    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

impl AppError {
    pub fn provider(status: u16, body: impl Into<String>) -> Self {
        AppError::ProviderApi {
            status: Some(status),
            body: body.into(),
        }
    }

    pub fn provider_unreachable(body: impl Into<String>) -> Self {
        AppError::ProviderApi {
            status: None,
            body: body.into(),
        }
    }

    /// True for provider-class failures.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::ProviderApi { .. })
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        tracing::error!("Database error: {e}");
        AppError::Database(e.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            AppError::AccountNotConnected(_) => (StatusCode::CONFLICT, "account_not_connected"),
            AppError::ProviderApi { .. } => (StatusCode::BAD_GATEWAY, "provider_error"),
            AppError::UnsupportedAccount(_) => (StatusCode::BAD_REQUEST, "unsupported_account"),
            AppError::Media(_) => (StatusCode::UNPROCESSABLE_ENTITY, "media_error"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            AppError::Crypto(_) => (StatusCode::INTERNAL_SERVER_ERROR, "crypto_error"),
            AppError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let body = json!({
            "error": {
                "code": code,
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}
