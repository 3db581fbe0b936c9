use super::tools::ToolNameRegistry;
use castor_schema::gemini::Part;
use serde_json::Value;
use uuid::Uuid;

/// Logical pieces of one model answer, extracted from
/// `candidates[0].content.parts`. Shared by every dialect's non-stream
/// assembler and by the fake-stream replay.
#[derive(Debug, Clone)]
pub enum Segment {
    Text(String),
    Reasoning {
        text: String,
        signature: Option<String>,
    },
    ToolCall {
        id: String,
        name: String,
        args: Value,
        signature: Option<String>,
    },
    InlineData {
        mime_type: String,
        data: String,
    },
}

pub fn new_call_id() -> String {
    format!("call_{}", Uuid::new_v4().simple())
}

/// Walk response parts into segments, resolving mangled tool names back to
/// the caller's originals.
pub fn parts_to_segments(parts: &[Part], registry: &ToolNameRegistry) -> Vec<Segment> {
    let mut segments = Vec::with_capacity(parts.len());

    for part in parts {
        if let Some(call) = &part.function_call {
            let safe_name = call.get("name").and_then(Value::as_str).unwrap_or_default();
            let args = call.get("args").cloned().unwrap_or(Value::Object(Default::default()));
            segments.push(Segment::ToolCall {
                id: new_call_id(),
                name: registry.resolve_original(safe_name),
                args,
                signature: part.thought_signature.clone(),
            });
            continue;
        }

        if part.is_thought() {
            segments.push(Segment::Reasoning {
                text: part.text.clone().unwrap_or_default(),
                signature: part.thought_signature.clone(),
            });
            continue;
        }

        if let Some(text) = &part.text {
            segments.push(Segment::Text(text.clone()));
            continue;
        }

        if let Some(inline) = &part.inline_data {
            let mime_type = inline
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or("image/png")
                .to_string();
            let data = inline
                .get("data")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            segments.push(Segment::InlineData { mime_type, data });
        }
    }

    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parts_map_to_segments_in_order() {
        let mut registry = ToolNameRegistry::new();
        let safe = registry.register("get weather");

        let parts: Vec<Part> = serde_json::from_value(json!([
            {"thought": true, "text": "thinking...", "thoughtSignature": "SIG"},
            {"text": "the answer"},
            {"functionCall": {"name": safe, "args": {"city": "BJ"}}}
        ]))
        .unwrap();

        let segments = parts_to_segments(&parts, &registry);
        assert_eq!(segments.len(), 3);
        assert!(matches!(&segments[0], Segment::Reasoning { text, signature }
            if text == "thinking..." && signature.as_deref() == Some("SIG")));
        assert!(matches!(&segments[1], Segment::Text(t) if t == "the answer"));
        assert!(matches!(&segments[2], Segment::ToolCall { name, args, .. }
            if name == "get weather" && args == &json!({"city": "BJ"})));
    }

    #[test]
    fn unregistered_tool_name_passes_through() {
        let registry = ToolNameRegistry::new();
        let parts: Vec<Part> =
            serde_json::from_value(json!([{"functionCall": {"name": "fn", "args": {}}}])).unwrap();
        let segments = parts_to_segments(&parts, &registry);
        assert!(matches!(&segments[0], Segment::ToolCall { name, .. } if name == "fn"));
    }
}
