use super::{
    ServeMode, acquire, cache_hints, directives_for, envelope_for, on_failure, on_success,
    parse_upstream_json, parser_for, record_signature, serve_mode,
};
use crate::accounts::VariantKind;
use crate::convert;
use crate::error::{CastorError, OpenaiError};
use crate::server::router::CastorState;
use crate::stream::{
    OpenaiWriter, StreamCollector, collect_stream, replay_sse_response, sse_response,
};
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use castor_schema::openai::ChatCompletionRequest;
use serde_json::Value;
use std::time::Duration;

pub async fn antigravity_chat(
    State(state): State<CastorState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, OpenaiError> {
    chat(state, VariantKind::Antigravity, body)
        .await
        .map_err(OpenaiError::from)
}

pub async fn cli_chat(
    State(state): State<CastorState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, OpenaiError> {
    chat(state, VariantKind::GeminiCli, body)
        .await
        .map_err(OpenaiError::from)
}

async fn chat(
    state: CastorState,
    kind: VariantKind,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, CastorError> {
    let Json(body) =
        body.map_err(|e| CastorError::InvalidRequest(format!("invalid JSON body: {e}")))?;
    let req: ChatCompletionRequest = serde_json::from_value(body)
        .map_err(|e| CastorError::InvalidRequest(format!("invalid request body: {e}")))?;
    if req.model.trim().is_empty() {
        return Err(CastorError::InvalidRequest("model is required".to_string()));
    }

    let directives = directives_for(kind, &req.model);
    let converted = convert::openai::to_upstream(&req, &directives, state.sigcache())?;

    let channel = state.channel(kind);
    let mode = serve_mode(req.stream, &directives, state.stream_cfg(), &directives.model);
    let heartbeat = Duration::from_secs(state.stream_cfg().heartbeat_secs);

    let lease = acquire(channel).await?;
    let hints = cache_hints(&converted, &directives.model);
    let parser = parser_for(&state, &converted, &directives.model);
    let registry = converted.tool_names.clone();
    let envelope = envelope_for(channel, &lease, &directives.model, converted.request);

    // Inner block so every failure path still reaches the rotation feedback.
    let result: Result<Response, CastorError> = async {
        match mode {
            ServeMode::Stream => {
                let upstream = channel
                    .upstream
                    .call(&channel.manager, &lease, &envelope, true)
                    .await?;
                Ok(sse_response(
                    upstream,
                    parser,
                    OpenaiWriter::new(&req.model),
                    heartbeat,
                ))
            }
            ServeMode::FakeStream => {
                let upstream = channel
                    .upstream
                    .call(&channel.manager, &lease, &envelope, false)
                    .await?;
                let response = parse_upstream_json(upstream).await?;
                let collector = StreamCollector::from_response(&response, &registry);
                record_signature(&state, &directives.model, &collector, hints);
                Ok(replay_sse_response(
                    collector.into_events(),
                    OpenaiWriter::new(&req.model),
                    heartbeat,
                ))
            }
            ServeMode::FakeNonStream => {
                let upstream = channel
                    .upstream
                    .call(&channel.manager, &lease, &envelope, true)
                    .await?;
                let collector = collect_stream(upstream, parser).await?;
                Ok(Json(collector.into_openai(&req.model)).into_response())
            }
            ServeMode::NonStream => {
                let upstream = channel
                    .upstream
                    .call(&channel.manager, &lease, &envelope, false)
                    .await?;
                let response = parse_upstream_json(upstream).await?;
                let collector = StreamCollector::from_response(&response, &registry);
                record_signature(&state, &directives.model, &collector, hints);
                Ok(Json(collector.into_openai(&req.model)).into_response())
            }
        }
    }
    .await;

    match &result {
        Ok(_) => on_success(channel, &lease),
        Err(err) => on_failure(channel, &lease, err),
    }
    result
}
