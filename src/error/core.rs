use super::{IsRetryable, OauthError};
use axum::http::StatusCode;
use thiserror::Error as ThisError;

/// Core error currency below the dialect layer. Handlers convert these into
/// the per-dialect envelopes at the HTTP boundary.
#[derive(Debug, ThisError)]
pub enum CastorError {
    /// The rotation pool has no usable account for this request.
    #[error("No available account")]
    NoAvailableAccount,

    /// OAuth refresh failed for one account. `status` carries the upstream
    /// HTTP status when one was observed; 400/403 disable the account.
    #[error("Token refresh failed for {token_id}: {message}")]
    TokenRefresh {
        token_id: String,
        status: Option<StatusCode>,
        message: String,
    },

    #[error("OAuth error: {0}")]
    Oauth(#[from] OauthError),

    /// Upstream 429; retried up to the configured budget, then surfaced.
    #[error("Upstream rate limited: {message:.300}")]
    UpstreamRateLimit { message: String },

    /// Upstream 403 whose body starts with "The caller does not". Treated as
    /// context overflow, not a credential problem.
    #[error("Upstream permission denied: {message:.300}")]
    UpstreamPermissionDenied { message: String },

    /// Any other upstream non-success status.
    #[error("Upstream error: status={status}, body={body:.300}")]
    UpstreamStatus { status: StatusCode, body: String },

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Token store error: {0}")]
    Store(String),

    #[error("Actor error: {0}")]
    Ractor(String),

    #[error("Stream protocol error: {0}")]
    StreamProtocol(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CastorError {
    /// HTTP status the dialect envelopes should carry.
    pub fn status(&self) -> StatusCode {
        match self {
            CastorError::NoAvailableAccount => StatusCode::SERVICE_UNAVAILABLE,
            CastorError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            CastorError::UpstreamRateLimit { .. } => StatusCode::TOO_MANY_REQUESTS,
            CastorError::UpstreamPermissionDenied { .. } => StatusCode::FORBIDDEN,
            CastorError::UpstreamStatus { status, .. } => *status,
            CastorError::TokenRefresh { .. }
            | CastorError::Oauth(_)
            | CastorError::Reqwest(_)
            | CastorError::StreamProtocol(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the client. Rate-limit and permission errors
    /// keep the upstream body; transport and internal errors stay generic.
    pub fn client_message(&self) -> String {
        match self {
            CastorError::NoAvailableAccount => {
                "No available accounts to process the request.".to_string()
            }
            CastorError::InvalidRequest(msg) => msg.clone(),
            CastorError::UpstreamRateLimit { message } => message.clone(),
            CastorError::UpstreamPermissionDenied { message } => message.clone(),
            CastorError::UpstreamStatus { status, .. } => {
                format!("Upstream returned {status}")
            }
            CastorError::Reqwest(_) | CastorError::StreamProtocol(_) => {
                "Upstream service error.".to_string()
            }
            _ => "An internal server error occurred.".to_string(),
        }
    }
}

impl IsRetryable for CastorError {
    fn is_retryable(&self) -> bool {
        // Only 429 is retried; everything else propagates to the handler.
        matches!(self, CastorError::UpstreamRateLimit { .. })
    }
}
