use super::CastorError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error as ThisError;

/// OpenAI-dialect boundary error. Everything below the handler is a
/// `CastorError`; this type owns the `{error:{message,type,code}}` envelope.
#[derive(Debug, ThisError)]
#[error("{source}")]
pub struct OpenaiError {
    #[from]
    pub source: CastorError,
}

#[derive(Debug, Serialize)]
pub struct OpenaiErrorBody {
    pub error: OpenaiErrorObject,
}

#[derive(Debug, Serialize)]
pub struct OpenaiErrorObject {
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub code: Option<String>,
}

fn error_type(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "invalid_request_error",
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => "authentication_error",
        StatusCode::TOO_MANY_REQUESTS => "rate_limit_error",
        status if status.is_server_error() => "server_error",
        _ => "api_error",
    }
}

impl OpenaiError {
    pub fn body(&self) -> OpenaiErrorBody {
        let status = self.source.status();
        OpenaiErrorBody {
            error: OpenaiErrorObject {
                message: self.source.client_message(),
                kind: error_type(status).to_string(),
                code: Some(status.as_u16().to_string()),
            },
        }
    }

    /// Error payload for a stream where headers are already on the wire.
    pub fn sse_payload(&self) -> Value {
        Self::payload_for(&self.source)
    }

    pub fn payload_for(source: &CastorError) -> Value {
        let status = source.status();
        json!({
            "error": {
                "message": source.client_message(),
                "type": error_type(status),
                "code": status.as_u16().to_string(),
            }
        })
    }
}

impl IntoResponse for OpenaiError {
    fn into_response(self) -> Response {
        let status = self.source.status();
        tracing::warn!(status = %status, error = %self.source, "OpenAI dialect error");
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_keys_match_dialect() {
        let err = OpenaiError::from(CastorError::InvalidRequest("missing messages".into()));
        let value = serde_json::to_value(err.body()).unwrap();
        assert_eq!(value["error"]["type"], "invalid_request_error");
        assert_eq!(value["error"]["message"], "missing messages");
        assert_eq!(value["error"]["code"], "400");
    }

    #[test]
    fn rate_limit_preserves_upstream_message() {
        let err = OpenaiError::from(CastorError::UpstreamRateLimit {
            message: "quota exhausted for gemini-2.5-pro".into(),
        });
        let value = serde_json::to_value(err.body()).unwrap();
        assert_eq!(value["error"]["type"], "rate_limit_error");
        assert_eq!(value["error"]["message"], "quota exhausted for gemini-2.5-pro");
    }
}
