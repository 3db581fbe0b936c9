use super::CastorError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use thiserror::Error as ThisError;

/// Anthropic-dialect boundary error with the
/// `{type:"error", error:{type,message}}` envelope.
#[derive(Debug, ThisError)]
#[error("{source}")]
pub struct ClaudeError {
    #[from]
    pub source: CastorError,
}

fn error_type(status: StatusCode) -> &'static str {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "authentication_error",
        StatusCode::TOO_MANY_REQUESTS => "rate_limit_error",
        StatusCode::BAD_REQUEST => "invalid_request_error",
        _ => "api_error",
    }
}

impl ClaudeError {
    pub fn body(&self) -> Value {
        Self::payload_for(&self.source)
    }

    pub fn sse_payload(&self) -> Value {
        self.body()
    }

    pub fn payload_for(source: &CastorError) -> Value {
        json!({
            "type": "error",
            "error": {
                "type": error_type(source.status()),
                "message": source.client_message(),
            }
        })
    }
}

impl IntoResponse for ClaudeError {
    fn into_response(self) -> Response {
        let status = self.source.status();
        tracing::warn!(status = %status, error = %self.source, "Claude dialect error");
        (status, Json(self.body())).into_response()
    }
}
