use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One conversation turn (or the system instruction, which carries no role).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    #[serde(default)]
    pub parts: Vec<Part>,

    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Some("user".to_string()),
            parts,
            extra: BTreeMap::new(),
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Some("model".to_string()),
            parts,
            extra: BTreeMap::new(),
        }
    }

    /// System instruction shape: no role, a single text part.
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: None,
            parts: vec![Part::text(text)],
            extra: BTreeMap::new(),
        }
    }

    pub fn is_model(&self) -> bool {
        self.role.as_deref() == Some("model")
    }
}

/// One atomic piece of content inside a turn.
///
/// Exactly one data field (`text`, `inlineData`, `functionCall`,
/// `functionResponse`, `fileData`) is expected per part; `thought` and
/// `thoughtSignature` are annotations that ride on whichever data field is
/// present. A part carrying only `thoughtSignature` is a standalone signature
/// placeholder that the converter folds onto its neighbor.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<bool>,

    /// Opaque reasoning-continuity token replayed across turns.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_call: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_response: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_data: Option<Value>,

    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn thought(text: impl Into<String>, signature: Option<String>) -> Self {
        Self {
            thought: Some(true),
            thought_signature: signature,
            text: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn function_call(name: &str, args: Value, signature: Option<String>) -> Self {
        Self {
            thought_signature: signature,
            function_call: Some(serde_json::json!({ "name": name, "args": args })),
            ..Default::default()
        }
    }

    pub fn function_response(name: &str, response: Value) -> Self {
        Self {
            function_response: Some(serde_json::json!({ "name": name, "response": response })),
            ..Default::default()
        }
    }

    pub fn inline_data(mime_type: &str, data: impl Into<String>) -> Self {
        Self {
            inline_data: Some(
                serde_json::json!({ "mimeType": mime_type, "data": data.into() }),
            ),
            ..Default::default()
        }
    }

    pub fn is_thought(&self) -> bool {
        self.thought == Some(true)
    }

    /// A placeholder that carries a signature and nothing else.
    pub fn is_signature_only(&self) -> bool {
        self.thought_signature.is_some()
            && self.thought.is_none()
            && self.text.is_none()
            && self.inline_data.is_none()
            && self.function_call.is_none()
            && self.function_response.is_none()
            && self.file_data.is_none()
    }

    /// True for part kinds a standalone signature may be folded onto.
    pub fn accepts_signature(&self) -> bool {
        self.is_thought() || self.function_call.is_some() || self.inline_data.is_some()
    }
}

/// Gemini `generateContent` / `streamGenerateContent` request body.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    #[serde(default)]
    pub contents: Vec<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<Tool>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_config: Option<Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub safety_settings: Option<Value>,

    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl GenerateContentRequest {
    /// Whether any function tool is declared on this request.
    pub fn has_function_tools(&self) -> bool {
        self.tools
            .as_deref()
            .unwrap_or_default()
            .iter()
            .any(|tool| {
                tool.function_declarations
                    .as_deref()
                    .is_some_and(|decls| !decls.is_empty())
            })
    }
}

/// `generationConfig` object. `thinkingConfig` stays a raw value because the
/// upstream keeps growing vendor fields inside it.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<i64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_config: Option<Value>,

    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// `tools[]` entry. Either function declarations or a built-in tool such as
/// `googleSearch`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_declarations: Option<Vec<FunctionDeclaration>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_search: Option<Value>,

    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Tool {
    pub fn functions(declarations: Vec<FunctionDeclaration>) -> Self {
        Self {
            function_declarations: Some(declarations),
            ..Default::default()
        }
    }

    pub fn google_search() -> Self {
        Self {
            google_search: Some(serde_json::json!({})),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,

    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn minimal_request_roundtrips() {
        let input = json!({
            "contents": [{"role": "user", "parts": [{"text": "hello"}]}]
        });
        let req: GenerateContentRequest = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(req.contents.len(), 1);
        assert_eq!(serde_json::to_value(&req).unwrap(), input);
    }

    #[test]
    fn unknown_fields_survive_in_extra() {
        let input = json!({
            "contents": [{"parts": [{"text": "ping"}]}],
            "sessionId": "-42",
            "cachedContent": "projects/x/cachedContents/y"
        });
        let req: GenerateContentRequest = serde_json::from_value(input.clone()).unwrap();
        assert_eq!(req.extra.get("sessionId"), Some(&json!("-42")));
        assert_eq!(serde_json::to_value(&req).unwrap(), input);
    }

    #[test]
    fn signature_only_part_is_detected() {
        let bare: Part = serde_json::from_value(json!({"thoughtSignature": "sig"})).unwrap();
        assert!(bare.is_signature_only());

        let on_thought: Part =
            serde_json::from_value(json!({"thought": true, "text": "t", "thoughtSignature": "sig"}))
                .unwrap();
        assert!(!on_thought.is_signature_only());
        assert!(on_thought.accepts_signature());

        let plain: Part = serde_json::from_value(json!({"text": "t"})).unwrap();
        assert!(!plain.accepts_signature());
    }

    #[test]
    fn function_call_constructor_shapes_payload() {
        let part = Part::function_call("get_weather", json!({"city": "BJ"}), Some("SIG".into()));
        assert_eq!(
            part.function_call,
            Some(json!({"name": "get_weather", "args": {"city": "BJ"}}))
        );
        assert_eq!(part.thought_signature.as_deref(), Some("SIG"));
    }

    #[test]
    fn function_response_uses_response_key() {
        let part = Part::function_response("get_weather", json!({"temp": 15}));
        let value = serde_json::to_value(&part).unwrap();
        assert!(value["functionResponse"]["response"].is_object());
        assert!(value["functionResponse"].get("reponse").is_none());
    }

    #[test]
    fn has_function_tools_ignores_builtin_tools() {
        let search_only: GenerateContentRequest = serde_json::from_value(json!({
            "contents": [],
            "tools": [{"googleSearch": {}}]
        }))
        .unwrap();
        assert!(!search_only.has_function_tools());

        let with_fn: GenerateContentRequest = serde_json::from_value(json!({
            "contents": [],
            "tools": [{"functionDeclarations": [{"name": "f", "description": "d"}]}]
        }))
        .unwrap();
        assert!(with_fn.has_function_tools());
    }
}
