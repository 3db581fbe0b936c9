use super::{
    ServeMode, acquire, cache_hints, directives_for, envelope_for, on_failure, on_success,
    parse_upstream_json, parser_for, record_signature, serve_mode,
};
use crate::accounts::VariantKind;
use crate::convert::{self, ModelDirectives};
use crate::error::{CastorError, GeminiError};
use crate::server::router::CastorState;
use crate::stream::{
    GeminiWriter, StreamCollector, collect_stream, replay_sse_response, sse_response,
};
use axum::{
    Json,
    extract::{Path, RawQuery, State, rejection::JsonRejection},
    response::{IntoResponse, Response},
};
use castor_schema::gemini::GenerateContentRequest;
use serde_json::Value;
use std::time::Duration;

pub async fn antigravity_generate(
    State(state): State<CastorState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, GeminiError> {
    generate(state, VariantKind::Antigravity, path, query, body)
        .await
        .map_err(GeminiError::from)
}

pub async fn cli_generate(
    State(state): State<CastorState>,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, GeminiError> {
    generate(state, VariantKind::GeminiCli, path, query, body)
        .await
        .map_err(GeminiError::from)
}

/// Split `{model}:{rpc}` out of the wildcard path tail and decide streaming:
/// `streamGenerateContent` always streams, `generateContent` streams only
/// with `alt=sse`.
fn parse_path(path: &str, query: Option<&str>) -> Result<(String, bool), CastorError> {
    let last = path.rsplit('/').next().unwrap_or(path);
    let (model, rpc) = last.split_once(':').ok_or_else(|| {
        CastorError::InvalidRequest(format!("missing rpc in path segment: {last}"))
    })?;
    if model.is_empty() {
        return Err(CastorError::InvalidRequest(
            "model not found in path".to_string(),
        ));
    }

    let alt_sse = query.is_some_and(|q| {
        url::form_urlencoded::parse(q.as_bytes()).any(|(k, v)| k == "alt" && v == "sse")
    });

    let stream = match rpc {
        "streamGenerateContent" => true,
        "generateContent" => alt_sse,
        other => {
            return Err(CastorError::InvalidRequest(format!(
                "unsupported rpc: {other}"
            )));
        }
    };
    Ok((model.to_string(), stream))
}

async fn generate(
    state: CastorState,
    kind: VariantKind,
    path: String,
    query: Option<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, CastorError> {
    let (raw_model, client_streams) = parse_path(&path, query.as_deref())?;

    let Json(body) =
        body.map_err(|e| CastorError::InvalidRequest(format!("invalid JSON body: {e}")))?;
    let mut request: GenerateContentRequest = serde_json::from_value(body)
        .map_err(|e| CastorError::InvalidRequest(format!("invalid request body: {e}")))?;

    // `_isStream` is a body-level streaming override some CLI clients send;
    // it must not reach the upstream.
    let client_streams = client_streams
        || request
            .extra
            .remove("_isStream")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

    let directives: ModelDirectives = directives_for(kind, &raw_model);
    let converted = convert::gemini::to_upstream(request, &directives, state.sigcache())?;

    let channel = state.channel(kind);
    let mode = serve_mode(
        client_streams,
        &directives,
        state.stream_cfg(),
        &directives.model,
    );
    let heartbeat = Duration::from_secs(state.stream_cfg().heartbeat_secs);
    let pass_signature = state.stream_cfg().pass_signature_to_client;

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
                    GeminiWriter::new(&directives.model, pass_signature),
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
                    GeminiWriter::new(&directives.model, pass_signature),
                    heartbeat,
                ))
            }
            ServeMode::FakeNonStream => {
                let upstream = channel
                    .upstream
                    .call(&channel.manager, &lease, &envelope, true)
                    .await?;
                let collector = collect_stream(upstream, parser).await?;
                Ok(Json(collector.into_gemini(&directives.model, pass_signature)).into_response())
            }
            ServeMode::NonStream => {
                let upstream = channel
                    .upstream
                    .call(&channel.manager, &lease, &envelope, false)
                    .await?;
                let response = parse_upstream_json(upstream).await?;
                let collector = StreamCollector::from_response(&response, &registry);
                record_signature(&state, &directives.model, &collector, hints);
                Ok(Json(collector.into_gemini(&directives.model, pass_signature)).into_response())
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_rpc_always_streams() {
        let (model, stream) = parse_path("gemini-2.5-pro:streamGenerateContent", None).unwrap();
        assert_eq!(model, "gemini-2.5-pro");
        assert!(stream);
    }

    #[test]
    fn generate_content_streams_only_with_alt_sse() {
        let (_, stream) = parse_path("gemini-2.5-pro:generateContent", None).unwrap();
        assert!(!stream);

        let (_, stream) = parse_path("gemini-2.5-pro:generateContent", Some("alt=sse")).unwrap();
        assert!(stream);
    }

    #[test]
    fn missing_rpc_is_invalid() {
        assert!(parse_path("gemini-2.5-pro", None).is_err());
        assert!(parse_path(":generateContent", None).is_err());
        assert!(parse_path("m:countTokens", None).is_err());
    }
}
