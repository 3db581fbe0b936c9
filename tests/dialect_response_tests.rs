//! Non-stream dialect bodies assembled from upstream responses.

use castor::convert::ToolNameRegistry;
use castor::stream::StreamCollector;
use castor_schema::gemini::GenerateContentResponse;
use serde_json::json;

fn thinking_response() -> GenerateContentResponse {
    serde_json::from_value(json!({
        "candidates": [{
            "content": {"role": "model", "parts": [
                {"thought": true, "text": "reasoning here", "thoughtSignature": "SIG2"},
                {"text": "hello"}
            ]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 6, "totalTokenCount": 10}
    }))
    .unwrap()
}

#[test]
fn claude_non_stream_thinking_body() {
    let collector = StreamCollector::from_response(&thinking_response(), &ToolNameRegistry::new());
    let body = serde_json::to_value(collector.into_claude("gemini-2.5-pro", true)).unwrap();

    assert_eq!(body["type"], "message");
    assert_eq!(body["role"], "assistant");
    assert_eq!(body["content"][0]["type"], "thinking");
    assert_eq!(body["content"][0]["thinking"], "reasoning here");
    assert_eq!(body["content"][0]["signature"], "SIG2");
    assert_eq!(body["content"][1]["type"], "text");
    assert_eq!(body["content"][1]["text"], "hello");
    assert_eq!(body["stop_reason"], "end_turn");
    assert_eq!(body["usage"]["input_tokens"], 4);
    assert_eq!(body["usage"]["output_tokens"], 6);
}

#[test]
fn claude_body_hides_signature_by_default() {
    let collector = StreamCollector::from_response(&thinking_response(), &ToolNameRegistry::new());
    let body = serde_json::to_value(collector.into_claude("gemini-2.5-pro", false)).unwrap();
    assert!(body["content"][0].get("signature").is_none());
}

#[test]
fn gemini_body_carries_finish_and_usage() {
    let collector = StreamCollector::from_response(&thinking_response(), &ToolNameRegistry::new());
    let body = collector.into_gemini("gemini-2.5-pro", false);

    assert_eq!(body["candidates"][0]["finishReason"], "STOP");
    assert_eq!(body["usageMetadata"]["totalTokenCount"], 10);
    let parts = body["candidates"][0]["content"]["parts"].as_array().unwrap();
    assert_eq!(parts[0]["thought"], true);
    assert!(parts[0].get("thoughtSignature").is_none());
    assert_eq!(parts[1]["text"], "hello");
}

#[test]
fn openai_body_splits_reasoning_from_content() {
    let collector = StreamCollector::from_response(&thinking_response(), &ToolNameRegistry::new());
    let body = serde_json::to_value(collector.into_openai("gemini-2.5-pro")).unwrap();

    let message = &body["choices"][0]["message"];
    assert_eq!(message["role"], "assistant");
    assert_eq!(message["content"], "hello");
    assert_eq!(message["reasoning_content"], "reasoning here");
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
    assert_eq!(body["usage"]["prompt_tokens"], 4);
}

#[test]
fn mangled_tool_names_resolve_back_to_originals() {
    let mut registry = ToolNameRegistry::new();
    let safe = registry.register("mcp server/list files");

    let response: GenerateContentResponse = serde_json::from_value(json!({
        "candidates": [{
            "content": {"role": "model", "parts": [
                {"functionCall": {"name": safe, "args": {"path": "/tmp"}}}
            ]},
            "finishReason": "STOP"
        }]
    }))
    .unwrap();

    let collector = StreamCollector::from_response(&response, &registry);
    let body = serde_json::to_value(collector.into_openai("m")).unwrap();
    assert_eq!(
        body["choices"][0]["message"]["tool_calls"][0]["function"]["name"],
        "mcp server/list files"
    );
}
