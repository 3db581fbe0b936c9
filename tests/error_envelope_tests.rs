//! Every dialect's error envelope, rendered through the real axum
//! `IntoResponse` path.

use axum::body::to_bytes;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use castor::error::{CastorError, ClaudeError, GeminiError, OpenaiError};
use serde_json::Value;

async fn body_of(response: axum::response::Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn rate_limit() -> CastorError {
    CastorError::UpstreamRateLimit {
        message: "quota exhausted".to_string(),
    }
}

#[tokio::test]
async fn openai_envelope_has_message_type_code() {
    let (status, body) = body_of(OpenaiError::from(rate_limit()).into_response()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    let error = &body["error"];
    assert_eq!(error["message"], "quota exhausted");
    assert_eq!(error["type"], "rate_limit_error");
    assert_eq!(error["code"], "429");
}

#[tokio::test]
async fn gemini_envelope_has_code_message_status() {
    let (status, body) = body_of(GeminiError::from(CastorError::NoAvailableAccount).into_response()).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let error = &body["error"];
    assert_eq!(error["code"], 503);
    assert_eq!(error["status"], "UNAVAILABLE");
    assert!(error["message"].is_string());
}

#[tokio::test]
async fn claude_envelope_is_typed_error() {
    let (status, body) = body_of(ClaudeError::from(rate_limit()).into_response()).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["type"], "error");
    assert_eq!(body["error"]["type"], "rate_limit_error");
    assert_eq!(body["error"]["message"], "quota exhausted");
}

#[tokio::test]
async fn invalid_request_maps_to_400_everywhere() {
    let make = || CastorError::InvalidRequest("missing model".to_string());

    let (status, body) = body_of(OpenaiError::from(make()).into_response()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request_error");

    let (status, body) = body_of(GeminiError::from(make()).into_response()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["status"], "INVALID_ARGUMENT");

    let (status, body) = body_of(ClaudeError::from(make()).into_response()).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn permission_denied_keeps_upstream_message() {
    let err = CastorError::UpstreamPermissionDenied {
        message: "The caller does not have permission".to_string(),
    };
    let (status, body) = body_of(OpenaiError::from(err).into_response()).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["message"], "The caller does not have permission");
}
