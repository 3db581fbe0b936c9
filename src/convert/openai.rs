//! OpenAI Chat Completions ⇄ upstream Gemini conversion.

use super::genconfig::{self, ThinkingDirective};
use super::signatures::SignatureResolver;
use super::tools::{ToolNameRegistry, clean_parameters};
use super::{ConvertedRequest, ModelDirectives};
use crate::error::CastorError;
use ahash::AHashMap;
use castor_schema::gemini::{
    Content, FunctionDeclaration, GenerateContentRequest, GenerationConfig, Part, Tool,
};
use castor_schema::openai::{ChatCompletionRequest, ChatContent, ChatMessage};
use castor_sigcache::SignatureCache;
use serde_json::{Value, json};
use std::sync::Arc;

pub fn to_upstream(
    req: &ChatCompletionRequest,
    directives: &ModelDirectives,
    sigcache: Arc<SignatureCache>,
) -> Result<ConvertedRequest, CastorError> {
    let mut registry = ToolNameRegistry::new();
    let mut declarations = Vec::new();

    for tool in req.tools.as_deref().unwrap_or_default() {
        if tool.kind != "function" {
            continue;
        }
        let safe = registry.register(&tool.function.name);
        let parameters = tool.function.parameters.clone().map(|mut schema| {
            clean_parameters(&mut schema);
            schema
        });
        declarations.push(FunctionDeclaration {
            name: safe,
            description: tool.function.description.clone().unwrap_or_default(),
            parameters,
            ..Default::default()
        });
    }

    let has_tools = !declarations.is_empty();
    let resolver = SignatureResolver::new(sigcache, &directives.model, has_tools);

    let mut tools = Vec::new();
    if has_tools {
        tools.push(Tool::functions(declarations));
    }
    if directives.search {
        tools.push(Tool::google_search());
    }

    // Maps assistant tool-call ids to the safe function names, so later
    // `tool` messages can name their functionResponse.
    let mut call_names: AHashMap<String, String> = AHashMap::new();
    let mut system_texts: Vec<String> = Vec::new();
    let mut contents: Vec<Content> = Vec::new();

    for message in &req.messages {
        match message.role.as_str() {
            "system" | "developer" => {
                if let Some(content) = &message.content {
                    let text = content.joined_text();
                    if !text.is_empty() {
                        system_texts.push(text);
                    }
                }
            }
            "assistant" => {
                contents.push(assistant_to_model(message, &registry, &resolver, &mut call_names));
            }
            "tool" => {
                let part = tool_message_to_part(message, &call_names);
                attach_to_last_user(&mut contents, part);
            }
            // Unknown roles degrade to user turns.
            _ => {
                contents.push(Content::user(user_parts(message.content.as_ref())));
            }
        }
    }

    if contents.is_empty() {
        contents.push(Content::user(vec![Part::text(" ")]));
    }

    let mut generation_config = GenerationConfig {
        temperature: req.temperature,
        top_p: req.top_p,
        max_output_tokens: req.max_output_tokens(),
        ..Default::default()
    };
    let thinking = directives
        .thinking
        .or_else(|| effort_directive(req.reasoning_effort.as_deref(), &mut generation_config));
    genconfig::normalize(&mut generation_config, thinking);

    let request = GenerateContentRequest {
        contents,
        system_instruction: (!system_texts.is_empty())
            .then(|| Content::system(system_texts.join("\n\n"))),
        generation_config: Some(generation_config),
        tools: (!tools.is_empty()).then_some(tools),
        tool_config: None,
        safety_settings: None,
        extra: Default::default(),
    };

    Ok(ConvertedRequest {
        request,
        tool_names: registry,
        has_tools,
    })
}

/// `reasoning_effort` maps onto a literal thinking budget when no model-name
/// directive already decided.
fn effort_directive(
    effort: Option<&str>,
    config: &mut GenerationConfig,
) -> Option<ThinkingDirective> {
    let budget = match effort? {
        "none" => return Some(ThinkingDirective::Off),
        "low" => 1024,
        "medium" => 8192,
        "high" => 24576,
        _ => return None,
    };
    genconfig::apply_thinking_budget(config, budget);
    None
}

fn user_parts(content: Option<&ChatContent>) -> Vec<Part> {
    let mut parts = Vec::new();
    match content {
        Some(ChatContent::Text(text)) => parts.push(Part::text(text.clone())),
        Some(ChatContent::Parts(chunks)) => {
            for chunk in chunks {
                match chunk.kind.as_str() {
                    "image_url" => {
                        if let Some(image) = &chunk.image_url {
                            parts.push(image_part(&image.url));
                        }
                    }
                    _ => {
                        if let Some(text) = &chunk.text {
                            parts.push(Part::text(text.clone()));
                        }
                    }
                }
            }
        }
        None => {}
    }
    if parts.is_empty() {
        parts.push(Part::text(" "));
    }
    parts
}

/// `data:` URLs become inlineData; anything else is referenced as fileData.
fn image_part(url: &str) -> Part {
    if let Some((mime_type, data)) = parse_data_url(url) {
        Part::inline_data(&mime_type, data)
    } else {
        Part {
            file_data: Some(json!({"fileUri": url})),
            ..Default::default()
        }
    }
}

fn parse_data_url(url: &str) -> Option<(String, String)> {
    let rest = url.strip_prefix("data:")?;
    let (meta, data) = rest.split_once(',')?;
    let mime_type = meta.strip_suffix(";base64").unwrap_or(meta);
    Some((
        if mime_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            mime_type.to_string()
        },
        data.to_string(),
    ))
}

fn assistant_to_model(
    message: &ChatMessage,
    registry: &ToolNameRegistry,
    resolver: &SignatureResolver,
    call_names: &mut AHashMap<String, String>,
) -> Content {
    let mut parts = Vec::new();

    if let Some(reasoning) = &message.reasoning_content
        && !reasoning.is_empty()
    {
        parts.push(Part::thought(
            reasoning.clone(),
            Some(resolver.reasoning_signature()),
        ));
    }

    if let Some(content) = &message.content {
        let text = content.joined_text();
        if !text.is_empty() {
            parts.push(Part::text(text));
        }
    }

    for call in message.tool_calls.as_deref().unwrap_or_default() {
        let safe = registry.resolve_safe(&call.function.name);
        call_names.insert(call.id.clone(), safe.clone());
        let args = decode_arguments(&call.function.arguments);
        parts.push(Part::function_call(
            &safe,
            args,
            Some(resolver.tool_signature()),
        ));
    }

    if parts.is_empty() {
        parts.push(Part::text(" "));
    }
    Content::model(parts)
}

/// Upstream wants an argument object; the dialect carries a JSON string.
/// Non-JSON input is wrapped rather than rejected.
fn decode_arguments(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value) if value.is_object() => value,
        _ if raw.trim().is_empty() => Value::Object(Default::default()),
        _ => json!({"query": raw}),
    }
}

fn tool_message_to_part(message: &ChatMessage, call_names: &AHashMap<String, String>) -> Part {
    let name = message
        .tool_call_id
        .as_deref()
        .and_then(|id| call_names.get(id).cloned())
        .or_else(|| message.name.clone())
        .unwrap_or_else(|| "tool".to_string());

    let text = message
        .content
        .as_ref()
        .map(ChatContent::joined_text)
        .unwrap_or_default();

    let response = match serde_json::from_str::<Value>(&text) {
        Ok(value) if value.is_object() => value,
        _ => json!({"result": text}),
    };

    Part::function_response(&name, response)
}

/// Tool results ride on the last user turn, or open a new one.
fn attach_to_last_user(contents: &mut Vec<Content>, part: Part) {
    match contents.last_mut() {
        Some(last) if last.role.as_deref() == Some("user") => last.parts.push(part),
        _ => contents.push(Content::user(vec![part])),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::plain_model;
    use castor_sigcache::{GatingPolicy, SENTINEL_SIGNATURE};
    use serde_json::json;

    fn cache() -> Arc<SignatureCache> {
        Arc::new(SignatureCache::new(GatingPolicy::default()))
    }

    fn convert(body: serde_json::Value) -> ConvertedRequest {
        let req: ChatCompletionRequest = serde_json::from_value(body).unwrap();
        let directives = plain_model(&req.model);
        to_upstream(&req, &directives, cache()).unwrap()
    }

    #[test]
    fn roles_map_to_upstream_roles() {
        let converted = convert(json!({
            "model": "gemini-2.5-pro",
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "hi"},
                {"role": "assistant", "content": "hello"},
                {"role": "user", "content": "bye"}
            ]
        }));

        let request = &converted.request;
        assert_eq!(
            request.system_instruction.as_ref().unwrap().parts[0]
                .text
                .as_deref(),
            Some("be terse")
        );
        let roles: Vec<_> = request
            .contents
            .iter()
            .map(|c| c.role.as_deref().unwrap().to_string())
            .collect();
        assert_eq!(roles, ["user", "model", "user"]);
    }

    #[test]
    fn tool_declarations_are_sanitized_and_cleaned() {
        let converted = convert(json!({
            "model": "gemini-2.5-pro",
            "messages": [{"role": "user", "content": "weather?"}],
            "tools": [{"type": "function", "function": {
                "name": "get weather",
                "description": "d",
                "parameters": {"type": "object", "$schema": "x"}
            }}]
        }));

        assert!(converted.has_tools);
        let tools = converted.request.tools.as_ref().unwrap();
        let decl = &tools[0].function_declarations.as_ref().unwrap()[0];
        assert_eq!(decl.name, "get_weather");
        let params = decl.parameters.as_ref().unwrap();
        assert_eq!(params["type"], "OBJECT");
        assert!(params.get("$schema").is_none());
        assert_eq!(converted.tool_names.resolve_original("get_weather"), "get weather");
    }

    #[test]
    fn assistant_tool_calls_become_function_call_parts_with_signature() {
        let converted = convert(json!({
            "model": "gemini-2.5-pro",
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"city\":\"BJ\"}"}
                }]},
                {"role": "tool", "tool_call_id": "call_1", "content": "{\"temp\": 15}"}
            ],
            "tools": [{"type": "function", "function": {"name": "get_weather", "parameters": {"type": "object", "properties": {}}}}]
        }));

        let contents = &converted.request.contents;
        let call_part = &contents[1].parts[0];
        assert_eq!(call_part.function_call.as_ref().unwrap()["name"], "get_weather");
        // Tool continuation always carries a signature, sentinel at worst.
        assert_eq!(
            call_part.thought_signature.as_deref(),
            Some(SENTINEL_SIGNATURE)
        );

        // The tool result landed as a functionResponse on a user turn.
        let response_part = &contents[2].parts[0];
        let fr = response_part.function_response.as_ref().unwrap();
        assert_eq!(fr["name"], "get_weather");
        assert_eq!(fr["response"]["temp"], 15);
    }

    #[test]
    fn non_json_tool_arguments_are_wrapped() {
        assert_eq!(decode_arguments("not json"), json!({"query": "not json"}));
        assert_eq!(decode_arguments(""), json!({}));
        assert_eq!(decode_arguments("{\"a\":1}"), json!({"a": 1}));
    }

    #[test]
    fn data_url_images_become_inline_data() {
        let converted = convert(json!({
            "model": "gemini-2.5-pro",
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "look"},
                {"type": "image_url", "image_url": {"url": "data:image/png;base64,QUJD"}}
            ]}]
        }));

        let parts = &converted.request.contents[0].parts;
        assert_eq!(parts[0].text.as_deref(), Some("look"));
        let inline = parts[1].inline_data.as_ref().unwrap();
        assert_eq!(inline["mimeType"], "image/png");
        assert_eq!(inline["data"], "QUJD");
    }

    #[test]
    fn empty_messages_get_a_placeholder_user_turn() {
        let converted = convert(json!({"model": "m", "messages": []}));
        assert_eq!(converted.request.contents.len(), 1);
        assert_eq!(converted.request.contents[0].role.as_deref(), Some("user"));
    }

    #[test]
    fn reasoning_effort_maps_to_thinking_budget() {
        let converted = convert(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "q"}],
            "reasoning_effort": "low"
        }));
        let thinking = converted
            .request
            .generation_config
            .as_ref()
            .unwrap()
            .thinking_config
            .as_ref()
            .unwrap();
        assert_eq!(thinking["thinkingBudget"], 1024);
    }
}
