pub mod admin;
pub mod claude;
pub mod gemini;
pub mod models;
pub mod openai;
pub mod ops;

use crate::accounts::{AccountLease, VariantKind};
use crate::config::StreamConfig;
use crate::convert::{ConvertedRequest, ModelDirectives, parse_model_directives, plain_model};
use crate::error::CastorError;
use crate::server::router::{CastorState, Channel};
use crate::stream::{SseParser, StreamCollector};
use castor_schema::codeassist::{CodeAssistRequest, unwrap_response};
use castor_schema::gemini::GenerateContentResponse;
use castor_sigcache::CacheHints;
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

/// How one request is served, given what the client asked for, the model
/// flags, and the fake-mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ServeMode {
    /// Upstream stream → client stream.
    Stream,
    /// Upstream non-stream → client stream (`假流式/`).
    FakeStream,
    /// Upstream stream → client JSON.
    FakeNonStream,
    /// Upstream non-stream → client JSON.
    NonStream,
}

pub(crate) fn serve_mode(
    client_streams: bool,
    directives: &ModelDirectives,
    cfg: &StreamConfig,
    model: &str,
) -> ServeMode {
    if client_streams {
        if directives.fake_stream {
            ServeMode::FakeStream
        } else {
            ServeMode::Stream
        }
    } else if (cfg.fake_non_stream || directives.anti_truncation) && !is_image_model(model) {
        ServeMode::FakeNonStream
    } else {
        ServeMode::NonStream
    }
}

/// Feature-flag model names are honored on the CLI channel only.
pub(crate) fn directives_for(kind: VariantKind, raw_model: &str) -> ModelDirectives {
    match kind {
        VariantKind::GeminiCli => parse_model_directives(raw_model),
        VariantKind::Antigravity => plain_model(raw_model),
    }
}

pub(crate) fn is_image_model(model: &str) -> bool {
    model.contains("image")
}

pub(crate) fn cache_hints(converted: &ConvertedRequest, model: &str) -> CacheHints {
    CacheHints {
        has_tools: converted.has_tools,
        is_image_model: is_image_model(model),
    }
}

/// Acquire an account; the manager has already refreshed it and bootstrapped
/// its project id.
pub(crate) async fn acquire(channel: &Channel) -> Result<AccountLease, CastorError> {
    channel
        .manager
        .get_token()
        .await?
        .ok_or(CastorError::NoAvailableAccount)
}

/// Wrap a converted request into the Code Assist envelope for this channel.
pub(crate) fn envelope_for(
    channel: &Channel,
    lease: &AccountLease,
    model: &str,
    mut converted_request: castor_schema::gemini::GenerateContentRequest,
) -> CodeAssistRequest {
    let user_prompt_id = match channel.variant.kind {
        VariantKind::Antigravity => {
            // Antigravity also wants a session id riding on the request body.
            converted_request
                .extra
                .entry("sessionId".to_string())
                .or_insert_with(|| {
                    Value::String(format!("-{}", rand::random::<u64>() >> 1))
                });
            format!("agent/{}/{}", Utc::now().timestamp_millis(), Uuid::new_v4())
        }
        VariantKind::GeminiCli => Uuid::new_v4().to_string(),
    };

    CodeAssistRequest {
        model: model.to_string(),
        project: lease
            .project_id
            .as_deref()
            .unwrap_or_default()
            .to_string(),
        user_prompt_id: Some(user_prompt_id),
        request: converted_request,
    }
}

/// Request accounting once a logical request succeeded.
pub(crate) fn on_success(channel: &Channel, lease: &AccountLease) {
    channel.manager.record_request(&lease.token_id);
}

/// Rotation feedback when a logical request failed after retries.
pub(crate) fn on_failure(channel: &Channel, lease: &AccountLease, err: &CastorError) {
    if matches!(err, CastorError::UpstreamRateLimit { .. }) {
        channel.manager.report_quota_exhausted(&lease.token_id);
    }
}

/// Parse a non-stream upstream reply, tolerating enveloped and bare bodies.
pub(crate) async fn parse_upstream_json(
    resp: reqwest::Response,
) -> Result<GenerateContentResponse, CastorError> {
    let value: Value = resp.json().await?;
    unwrap_response(value).map_err(CastorError::Json)
}

/// Non-stream responses update the signature cache too; a signature that
/// arrives in one JSON body is just as replayable as a streamed one.
pub(crate) fn record_signature(
    state: &CastorState,
    model: &str,
    collector: &StreamCollector,
    hints: CacheHints,
) {
    if let Some(signature) = &collector.reasoning_signature {
        state
            .sigcache()
            .set_signature(None, model, signature, &collector.reasoning, hints);
    }
}

pub(crate) fn parser_for(
    state: &CastorState,
    converted: &ConvertedRequest,
    model: &str,
) -> SseParser {
    let hints = cache_hints(converted, model);
    let images = is_image_model(model).then(|| state.image_store());
    SseParser::new(
        converted.tool_names.clone(),
        model,
        state.sigcache(),
        hints,
        images,
    )
}

/// Admin envelope shared by the token-management routes.
pub(crate) fn admin_ok(data: Value) -> Value {
    json!({"success": true, "message": "ok", "data": data})
}

pub(crate) fn admin_err(message: impl std::fmt::Display) -> Value {
    json!({"success": false, "message": message.to_string()})
}
