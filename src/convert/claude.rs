//! Anthropic Messages ⇄ upstream Gemini conversion.

use super::genconfig;
use super::signatures::SignatureResolver;
use super::tools::{ToolNameRegistry, clean_parameters};
use super::{ConvertedRequest, ModelDirectives};
use crate::error::CastorError;
use ahash::AHashMap;
use castor_schema::claude::{
    ClaudeContent, ClaudeMessage, ContentBlock, ImageSource, MessagesRequest,
};
use castor_schema::gemini::{
    Content, FunctionDeclaration, GenerateContentRequest, GenerationConfig, Part, Tool,
};
use castor_sigcache::SignatureCache;
use serde_json::{Value, json};
use std::sync::Arc;

pub fn to_upstream(
    req: &MessagesRequest,
    directives: &ModelDirectives,
    sigcache: Arc<SignatureCache>,
) -> Result<ConvertedRequest, CastorError> {
    let mut registry = ToolNameRegistry::new();
    let mut declarations = Vec::new();

    for tool in req.tools.as_deref().unwrap_or_default() {
        let safe = registry.register(&tool.name);
        let parameters = tool.input_schema.clone().map(|mut schema| {
            clean_parameters(&mut schema);
            schema
        });
        declarations.push(FunctionDeclaration {
            name: safe,
            description: tool.description.clone().unwrap_or_default(),
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

    // tool_use id -> safe name, for naming the matching tool_result.
    let mut use_names: AHashMap<String, String> = AHashMap::new();
    let mut contents = Vec::with_capacity(req.messages.len());
    for message in &req.messages {
        contents.push(convert_message(message, &registry, &resolver, &mut use_names));
    }
    if contents.is_empty() {
        contents.push(Content::user(vec![Part::text(" ")]));
    }

    let mut generation_config = GenerationConfig {
        temperature: req.temperature,
        top_p: req.top_p,
        top_k: req.top_k,
        max_output_tokens: req.max_tokens,
        ..Default::default()
    };
    apply_thinking(req, directives, &mut generation_config);

    let request = GenerateContentRequest {
        contents,
        system_instruction: req
            .system
            .as_ref()
            .map(|system| system.joined_text())
            .filter(|text| !text.trim().is_empty())
            .map(Content::system),
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

/// Model-name directives outrank the request's `thinking` parameter.
fn apply_thinking(
    req: &MessagesRequest,
    directives: &ModelDirectives,
    config: &mut GenerationConfig,
) {
    if directives.thinking.is_some() {
        genconfig::normalize(config, directives.thinking);
        return;
    }

    match &req.thinking {
        Some(param) if param.is_enabled() => {
            genconfig::apply_thinking_budget(config, param.budget_tokens.unwrap_or(-1));
        }
        Some(_) => genconfig::apply_thinking_budget(config, 0),
        None => {}
    }
    genconfig::normalize(config, None);
}

fn convert_message(
    message: &ClaudeMessage,
    registry: &ToolNameRegistry,
    resolver: &SignatureResolver,
    use_names: &mut AHashMap<String, String>,
) -> Content {
    let is_assistant = message.role == "assistant";
    let mut parts = Vec::new();

    match &message.content {
        ClaudeContent::Text(text) => parts.push(Part::text(text.clone())),
        ClaudeContent::Blocks(blocks) => {
            for block in blocks {
                match block {
                    ContentBlock::Text { text } => parts.push(Part::text(text.clone())),
                    ContentBlock::Thinking {
                        thinking,
                        signature,
                    } => {
                        let signature = signature
                            .clone()
                            .filter(|s| !s.is_empty())
                            .unwrap_or_else(|| resolver.reasoning_signature());
                        parts.push(Part::thought(thinking.clone(), Some(signature)));
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        let safe = registry.resolve_safe(name);
                        use_names.insert(id.clone(), safe.clone());
                        parts.push(Part::function_call(
                            &safe,
                            input.clone(),
                            Some(resolver.tool_signature()),
                        ));
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        content,
                        is_error,
                    } => {
                        let name = use_names
                            .get(tool_use_id)
                            .cloned()
                            .unwrap_or_else(|| "tool".to_string());
                        parts.push(Part::function_response(
                            &name,
                            tool_result_value(content.as_ref(), *is_error),
                        ));
                    }
                    ContentBlock::Image { source } => {
                        if let Some(part) = image_to_part(source) {
                            parts.push(part);
                        }
                    }
                    ContentBlock::Unknown => {}
                }
            }
        }
    }

    if parts.is_empty() {
        parts.push(Part::text(" "));
    }
    if is_assistant {
        Content::model(parts)
    } else {
        Content::user(parts)
    }
}

/// Flatten a tool_result payload into the functionResponse `response`
/// object. String and block-list contents collapse to text.
fn tool_result_value(content: Option<&Value>, is_error: Option<bool>) -> Value {
    let mut response = match content {
        Some(Value::String(text)) => json!({"result": text}),
        Some(Value::Array(blocks)) => {
            let text: Vec<&str> = blocks
                .iter()
                .filter_map(|block| block.get("text").and_then(Value::as_str))
                .collect();
            json!({"result": text.join("\n")})
        }
        Some(Value::Object(obj)) => Value::Object(obj.clone()),
        _ => json!({"result": ""}),
    };
    if is_error == Some(true)
        && let Some(obj) = response.as_object_mut()
    {
        obj.insert("isError".to_string(), Value::Bool(true));
    }
    response
}

fn image_to_part(source: &ImageSource) -> Option<Part> {
    match source.kind.as_str() {
        "base64" => Some(Part::inline_data(
            source.media_type.as_deref().unwrap_or("image/png"),
            source.data.clone()?,
        )),
        "url" => Some(Part {
            file_data: Some(json!({"fileUri": source.url.clone()?})),
            ..Default::default()
        }),
        _ => None,
    }
}
