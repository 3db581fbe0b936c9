use super::CastorError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error as ThisError;

/// Gemini-dialect boundary error with the `{error:{code,message,status}}`
/// envelope.
#[derive(Debug, ThisError)]
#[error("{source}")]
pub struct GeminiError {
    #[from]
    pub source: CastorError,
}

#[derive(Debug, Serialize)]
pub struct GeminiErrorBody {
    pub error: GeminiErrorObject,
}

#[derive(Debug, Serialize)]
pub struct GeminiErrorObject {
    pub code: u16,
    pub message: String,
    pub status: String,
}

fn canonical_status(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "INVALID_ARGUMENT",
        StatusCode::UNAUTHORIZED => "UNAUTHENTICATED",
        StatusCode::FORBIDDEN => "PERMISSION_DENIED",
        StatusCode::NOT_FOUND => "NOT_FOUND",
        StatusCode::TOO_MANY_REQUESTS => "RESOURCE_EXHAUSTED",
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY => "UNAVAILABLE",
        StatusCode::INTERNAL_SERVER_ERROR => "INTERNAL",
        _ => "UNKNOWN",
    }
}

impl GeminiError {
    pub fn body(&self) -> GeminiErrorBody {
        let status = self.source.status();
        GeminiErrorBody {
            error: GeminiErrorObject {
                code: status.as_u16(),
                message: self.source.client_message(),
                status: canonical_status(status).to_string(),
            },
        }
    }

    pub fn sse_payload(&self) -> Value {
        Self::payload_for(&self.source)
    }

    pub fn payload_for(source: &CastorError) -> Value {
        let status = source.status();
        json!({
            "error": {
                "code": status.as_u16(),
                "message": source.client_message(),
                "status": canonical_status(status),
            }
        })
    }
}

impl IntoResponse for GeminiError {
    fn into_response(self) -> Response {
        let status = self.source.status();
        tracing::warn!(status = %status, error = %self.source, "Gemini dialect error");
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_keys_match_dialect() {
        let err = GeminiError::from(CastorError::NoAvailableAccount);
        let value = serde_json::to_value(err.body()).unwrap();
        assert_eq!(value["error"]["code"], 503);
        assert_eq!(value["error"]["status"], "UNAVAILABLE");
        assert!(value["error"]["message"].is_string());
    }

    #[test]
    fn upstream_status_passes_through() {
        let err = GeminiError::from(CastorError::UpstreamStatus {
            status: StatusCode::NOT_FOUND,
            body: "model missing".into(),
        });
        let value = serde_json::to_value(err.body()).unwrap();
        assert_eq!(value["error"]["code"], 404);
        assert_eq!(value["error"]["status"], "NOT_FOUND");
    }
}
