//! Thought-signature replay.
//!
//! Upstream accepts a multi-turn reasoning conversation only when prior
//! `model` turns replay a signature it recognizes. Resolution order per
//! request: cached signature for `(model, bucket)` → hardcoded per-model
//! default → the sentinel bypass.

use castor_schema::gemini::Content;
use castor_sigcache::{SENTINEL_SIGNATURE, SignatureCache};
use std::sync::Arc;

/// Captured defaults for models whose launch builds shipped a stable
/// signature. Checked after the cache, before the sentinel.
fn builtin_default(model: &str) -> Option<&'static str> {
    match model {
        "gemini-3-pro-preview" | "gemini-3-pro-image-preview" => Some(
            "CsgBAcu98fX1yNrZm93UIrTYZ3TW06a8GYTZaTaxWUYaWFGtKbPcZSFpilXW4sDFZFlFYrKWVp1-FSYseC8xlhGPkK0qjMYr1A4N",
        ),
        _ => None,
    }
}

/// Resolves replay signatures for one converted request.
#[derive(Clone)]
pub struct SignatureResolver {
    cache: Arc<SignatureCache>,
    model: String,
    has_tools: bool,
}

impl SignatureResolver {
    pub fn new(cache: Arc<SignatureCache>, model: &str, has_tools: bool) -> Self {
        Self {
            cache,
            model: model.to_string(),
            has_tools,
        }
    }

    fn resolve(&self, bucket_has_tools: bool) -> String {
        if let Some(entry) = self
            .cache
            .get_signature(None, &self.model, bucket_has_tools)
        {
            return entry.signature.to_string();
        }
        builtin_default(&self.model)
            .unwrap_or(SENTINEL_SIGNATURE)
            .to_string()
    }

    /// Signature for historical reasoning parts, keyed by whether this
    /// request carries tools.
    pub fn reasoning_signature(&self) -> String {
        self.resolve(self.has_tools)
    }

    /// Signature for function-call parts. Always the tool bucket: tool
    /// continuation needs it even when thinking is disabled.
    pub fn tool_signature(&self) -> String {
        self.resolve(true)
    }
}

/// Attach resolved signatures to the model turns of an upstream request:
/// reasoning parts and function-call parts that arrived without one.
pub fn replay_into_contents(contents: &mut [Content], resolver: &SignatureResolver) {
    for content in contents.iter_mut().filter(|c| c.is_model()) {
        for part in &mut content.parts {
            if part.thought_signature.is_some() {
                continue;
            }
            if part.function_call.is_some() {
                part.thought_signature = Some(resolver.tool_signature());
            } else if part.is_thought() {
                part.thought_signature = Some(resolver.reasoning_signature());
            }
        }
    }
}

/// Fold standalone signature-only parts onto their neighbors.
///
/// Some clients echo model turns with the signature split into its own
/// placeholder part. Signatures are collected in order and assigned, in
/// order, to the parts that can carry one (thought, functionCall,
/// inlineData) and don't already; the placeholders are dropped.
pub fn fold_standalone_signatures(content: &mut Content) {
    let has_standalone = content.parts.iter().any(|p| p.is_signature_only());
    if !has_standalone {
        return;
    }

    let mut pending: Vec<String> = Vec::new();
    let mut kept = Vec::with_capacity(content.parts.len());
    for part in content.parts.drain(..) {
        if part.is_signature_only() {
            if let Some(signature) = part.thought_signature {
                pending.push(signature);
            }
        } else {
            kept.push(part);
        }
    }

    let mut pending = pending.into_iter();
    for part in &mut kept {
        if part.accepts_signature() && part.thought_signature.is_none() {
            match pending.next() {
                Some(signature) => part.thought_signature = Some(signature),
                None => break,
            }
        }
    }

    content.parts = kept;
}

#[cfg(test)]
mod tests {
    use super::*;
    use castor_sigcache::{CacheHints, GatingPolicy};
    use serde_json::json;

    fn cache() -> Arc<SignatureCache> {
        Arc::new(SignatureCache::new(GatingPolicy {
            cache_all: true,
            ..Default::default()
        }))
    }

    fn model_content(parts: serde_json::Value) -> Content {
        serde_json::from_value(json!({"role": "model", "parts": parts})).unwrap()
    }

    #[test]
    fn cached_signature_wins_over_sentinel() {
        let cache = cache();
        cache.set_signature(
            None,
            "gemini-2.5-pro",
            "SIG_CACHED",
            "",
            CacheHints {
                has_tools: true,
                is_image_model: false,
            },
        );

        let resolver = SignatureResolver::new(cache, "gemini-2.5-pro", true);
        assert_eq!(resolver.tool_signature(), "SIG_CACHED");
        assert_eq!(resolver.reasoning_signature(), "SIG_CACHED");
    }

    #[test]
    fn unknown_model_falls_back_to_sentinel() {
        let resolver = SignatureResolver::new(cache(), "gemini-2.5-pro", false);
        assert_eq!(resolver.reasoning_signature(), SENTINEL_SIGNATURE);
    }

    #[test]
    fn builtin_default_beats_sentinel() {
        let resolver = SignatureResolver::new(cache(), "gemini-3-pro-preview", false);
        assert_ne!(resolver.reasoning_signature(), SENTINEL_SIGNATURE);
    }

    #[test]
    fn replay_attaches_to_function_calls_and_thoughts_only() {
        let cache = cache();
        cache.set_signature(
            None,
            "m",
            "SIG_TOOL",
            "",
            CacheHints {
                has_tools: true,
                is_image_model: false,
            },
        );
        let resolver = SignatureResolver::new(cache, "m", true);

        let mut contents: Vec<Content> = vec![
            serde_json::from_value(json!({"role": "user", "parts": [{"text": "q"}]})).unwrap(),
            model_content(json!([
                {"thought": true, "text": "hmm"},
                {"text": "answer"},
                {"functionCall": {"name": "f", "args": {}}}
            ])),
        ];

        replay_into_contents(&mut contents, &resolver);

        assert!(contents[0].parts[0].thought_signature.is_none());
        assert_eq!(
            contents[1].parts[0].thought_signature.as_deref(),
            Some("SIG_TOOL")
        );
        assert!(contents[1].parts[1].thought_signature.is_none());
        assert_eq!(
            contents[1].parts[2].thought_signature.as_deref(),
            Some("SIG_TOOL")
        );
    }

    #[test]
    fn existing_signatures_are_not_overwritten() {
        let resolver = SignatureResolver::new(cache(), "m", false);
        let mut contents = vec![model_content(json!([
            {"thought": true, "text": "hmm", "thoughtSignature": "KEEP"}
        ]))];
        replay_into_contents(&mut contents, &resolver);
        assert_eq!(contents[0].parts[0].thought_signature.as_deref(), Some("KEEP"));
    }

    #[test]
    fn standalone_signatures_fold_onto_neighbors_in_order() {
        let mut content = model_content(json!([
            {"thoughtSignature": "SIG_A"},
            {"thought": true, "text": "think"},
            {"thoughtSignature": "SIG_B"},
            {"functionCall": {"name": "f", "args": {}}},
            {"text": "plain"}
        ]));

        fold_standalone_signatures(&mut content);

        assert_eq!(content.parts.len(), 3);
        assert_eq!(content.parts[0].thought_signature.as_deref(), Some("SIG_A"));
        assert_eq!(content.parts[1].thought_signature.as_deref(), Some("SIG_B"));
        assert!(content.parts[2].thought_signature.is_none());
    }

    #[test]
    fn fold_is_a_no_op_without_placeholders() {
        let mut content = model_content(json!([{"text": "plain"}]));
        fold_standalone_signatures(&mut content);
        assert_eq!(content.parts.len(), 1);
    }
}
