//! Gemini-dialect pass-through normalization.
//!
//! Native Gemini requests already carry the upstream shape; they only need
//! tool-name sanitization, signature rebalancing (fold standalone signature
//! parts, replay cached signatures on model turns), and generation-config
//! clamping.

use super::signatures::{SignatureResolver, fold_standalone_signatures, replay_into_contents};
use super::tools::{ToolNameRegistry, clean_parameters};
use super::{ConvertedRequest, ModelDirectives};
use crate::error::CastorError;
use castor_schema::gemini::{GenerateContentRequest, Tool};
use castor_sigcache::SignatureCache;
use serde_json::Value;
use std::sync::Arc;

pub fn to_upstream(
    mut request: GenerateContentRequest,
    directives: &ModelDirectives,
    sigcache: Arc<SignatureCache>,
) -> Result<ConvertedRequest, CastorError> {
    if request.contents.is_empty() {
        return Err(CastorError::InvalidRequest(
            "contents must not be empty".to_string(),
        ));
    }

    let mut registry = ToolNameRegistry::new();
    if let Some(tools) = request.tools.as_mut() {
        for tool in tools.iter_mut() {
            for decl in tool.function_declarations.iter_mut().flatten() {
                decl.name = registry.register(&decl.name);
                if let Some(parameters) = decl.parameters.as_mut() {
                    clean_parameters(parameters);
                }
            }
        }
    }
    let has_tools = request.has_function_tools();

    if directives.search
        && !request
            .tools
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|tool| tool.google_search.is_some())
    {
        request
            .tools
            .get_or_insert_with(Vec::new)
            .push(Tool::google_search());
    }

    // History function calls/responses must use the sanitized names too.
    for content in &mut request.contents {
        for part in &mut content.parts {
            if let Some(call) = part.function_call.as_mut()
                && let Some(name) = call.get("name").and_then(Value::as_str)
            {
                let safe = registry.resolve_safe(name);
                call["name"] = Value::String(safe);
            }
            if let Some(response) = part.function_response.as_mut()
                && let Some(name) = response.get("name").and_then(Value::as_str)
            {
                let safe = registry.resolve_safe(name);
                response["name"] = Value::String(safe);
            }
        }
    }

    for content in &mut request.contents {
        fold_standalone_signatures(content);
    }
    let resolver = SignatureResolver::new(sigcache, &directives.model, has_tools);
    replay_into_contents(&mut request.contents, &resolver);

    let mut generation_config = request.generation_config.take().unwrap_or_default();
    super::genconfig::normalize(&mut generation_config, directives.thinking);
    request.generation_config = Some(generation_config);

    Ok(ConvertedRequest {
        request,
        tool_names: registry,
        has_tools,
    })
}
