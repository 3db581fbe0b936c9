use ahash::AHashMap;
use serde_json::Value;

/// Maximum tool-name length the upstream accepts.
const MAX_TOOL_NAME_LEN: usize = 63;

/// Schema keys the upstream's OpenAPI-subset validator rejects.
const DROPPED_SCHEMA_KEYS: &[&str] = &[
    "$schema",
    "$id",
    "$defs",
    "definitions",
    "additionalProperties",
    "unevaluatedProperties",
    "patternProperties",
    "propertyNames",
    "exclusiveMinimum",
    "exclusiveMaximum",
    "strict",
];

/// Per-request bijection between caller tool names and the sanitized names
/// sent upstream. Streaming function-call events look up the inverse so the
/// dialect response carries the caller's original name.
#[derive(Debug, Default, Clone)]
pub struct ToolNameRegistry {
    to_safe: AHashMap<String, String>,
    to_original: AHashMap<String, String>,
}

impl ToolNameRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a caller-visible tool name, returning the sanitized name to
    /// declare upstream. Registering the same name twice is idempotent.
    pub fn register(&mut self, original: &str) -> String {
        if let Some(safe) = self.to_safe.get(original) {
            return safe.clone();
        }

        let base = sanitize_name(original);
        let mut safe = base.clone();
        let mut suffix = 2usize;
        while self.to_original.contains_key(&safe) {
            safe = format!("{base}_{suffix}");
            suffix += 1;
        }

        self.to_safe.insert(original.to_string(), safe.clone());
        self.to_original.insert(safe.clone(), original.to_string());
        safe
    }

    /// Safe name for an already-registered tool; unknown names pass through
    /// sanitized but unregistered (history may mention tools the request no
    /// longer declares).
    pub fn resolve_safe(&self, original: &str) -> String {
        self.to_safe
            .get(original)
            .cloned()
            .unwrap_or_else(|| sanitize_name(original))
    }

    /// Original caller name for a sanitized name coming back from upstream.
    pub fn resolve_original(&self, safe: &str) -> String {
        self.to_original
            .get(safe)
            .cloned()
            .unwrap_or_else(|| safe.to_string())
    }

    pub fn is_empty(&self) -> bool {
        self.to_safe.is_empty()
    }
}

/// Restrict a tool name to `[A-Za-z0-9_.-]`, starting with a letter or
/// underscore, at most 63 chars.
fn sanitize_name(original: &str) -> String {
    let mut safe: String = original
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if safe.is_empty() {
        safe.push_str("tool");
    }
    let first = safe.chars().next().expect("non-empty after fallback");
    if !(first.is_ascii_alphabetic() || first == '_') {
        safe.insert(0, '_');
    }
    if safe.len() > MAX_TOOL_NAME_LEN {
        safe.truncate(MAX_TOOL_NAME_LEN);
    }
    safe
}

/// Scrub a JSON-Schema parameters object into the subset the upstream
/// accepts: drop unsupported keys everywhere, uppercase the top-level
/// `type: object` to `OBJECT`, and default missing `properties` to `{}`.
pub fn clean_parameters(schema: &mut Value) {
    drop_unsupported_keys(schema);

    if let Some(obj) = schema.as_object_mut() {
        let is_object_type = obj
            .get("type")
            .and_then(Value::as_str)
            .is_some_and(|t| t.eq_ignore_ascii_case("object"));
        if is_object_type {
            obj.insert("type".to_string(), Value::String("OBJECT".to_string()));
            obj.entry("properties")
                .or_insert_with(|| Value::Object(Default::default()));
        }
    }
}

fn drop_unsupported_keys(value: &mut Value) {
    match value {
        Value::Object(obj) => {
            for key in DROPPED_SCHEMA_KEYS {
                obj.remove(*key);
            }
            for child in obj.values_mut() {
                drop_unsupported_keys(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                drop_unsupported_keys(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sanitize_then_inverse_resolves_original() {
        let mut registry = ToolNameRegistry::new();
        let names = [
            "get_weather",
            "mcp__server/list files",
            "查询天气",
            "9pins",
            "weird!!name",
        ];
        for name in names {
            let safe = registry.register(name);
            assert!(
                safe.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '-'),
                "unsafe char in {safe:?}"
            );
            let first = safe.chars().next().unwrap();
            assert!(first.is_ascii_alphabetic() || first == '_');
            assert_eq!(registry.resolve_original(&safe), name);
        }
    }

    #[test]
    fn colliding_sanitizations_stay_distinct() {
        let mut registry = ToolNameRegistry::new();
        let a = registry.register("run command");
        let b = registry.register("run_command");
        let c = registry.register("run/command");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(b, c);
        assert_eq!(registry.resolve_original(&a), "run command");
        assert_eq!(registry.resolve_original(&b), "run_command");
        assert_eq!(registry.resolve_original(&c), "run/command");
    }

    #[test]
    fn register_is_idempotent() {
        let mut registry = ToolNameRegistry::new();
        let first = registry.register("get_weather");
        let second = registry.register("get_weather");
        assert_eq!(first, second);
    }

    #[test]
    fn long_names_are_truncated() {
        let mut registry = ToolNameRegistry::new();
        let safe = registry.register(&"x".repeat(200));
        assert!(safe.len() <= MAX_TOOL_NAME_LEN);
    }

    #[test]
    fn clean_parameters_uppercases_object_and_defaults_properties() {
        let mut schema = json!({"type": "object"});
        clean_parameters(&mut schema);
        assert_eq!(schema["type"], "OBJECT");
        assert!(schema["properties"].is_object());
    }

    #[test]
    fn clean_parameters_drops_unsupported_keys_recursively() {
        let mut schema = json!({
            "type": "object",
            "$schema": "http://json-schema.org/draft-07/schema#",
            "additionalProperties": false,
            "properties": {
                "query": {
                    "type": "string",
                    "exclusiveMinimum": 0
                },
                "nested": {
                    "type": "object",
                    "additionalProperties": {"type": "string"},
                    "properties": {}
                }
            }
        });
        clean_parameters(&mut schema);
        assert!(schema.get("$schema").is_none());
        assert!(schema.get("additionalProperties").is_none());
        assert!(schema["properties"]["query"].get("exclusiveMinimum").is_none());
        assert!(schema["properties"]["nested"].get("additionalProperties").is_none());
        // Nested object types keep their original casing.
        assert_eq!(schema["properties"]["nested"]["type"], "object");
    }
}
