//! End-to-end stream-engine scenarios: upstream SSE transcript in, dialect
//! frames out.

use castor::convert::ToolNameRegistry;
use castor::stream::{
    ClaudeWriter, DialectWriter, OpenaiWriter, SseParser, StreamCollector, StreamEvent,
};
use castor_sigcache::{CacheHints, GatingPolicy, SignatureCache};
use serde_json::json;
use std::sync::Arc;

fn cache() -> Arc<SignatureCache> {
    Arc::new(SignatureCache::new(GatingPolicy::default()))
}

fn frame(value: serde_json::Value) -> Vec<u8> {
    format!("data: {value}\n\n").into_bytes()
}

fn rendered(frames: &[axum::response::sse::Event]) -> String {
    format!("{frames:?}")
}

#[test]
fn openai_stream_with_tool_call_produces_expected_frames() {
    let mut registry = ToolNameRegistry::new();
    registry.register("get_weather");
    let cache = cache();
    let mut parser = SseParser::new(
        registry,
        "gemini-2.5-pro",
        cache.clone(),
        CacheHints {
            has_tools: true,
            is_image_model: false,
        },
        None,
    );
    let mut writer = OpenaiWriter::new("gemini-2.5-pro");

    let mut frames = Vec::new();
    for event in parser.feed(&frame(json!({
        "response": {"candidates": [{"content": {"parts": [{
            "functionCall": {"name": "get_weather", "args": {"city": "BJ"}},
            "thoughtSignature": "SIG1"
        }]}}]}
    }))) {
        frames.extend(writer.on_event(&event));
    }
    for event in parser.feed(&frame(json!({
        "response": {
            "candidates": [{"finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 3, "totalTokenCount": 10}
        }
    }))) {
        frames.extend(writer.on_event(&event));
    }
    frames.extend(parser.finish().iter().flat_map(|event| writer.on_event(event)));
    frames.extend(writer.finish());

    let out = rendered(&frames);
    // Role seed, tool-call delta with original name and JSON-string args,
    // final chunk with finish_reason + usage, then the [DONE] marker.
    let role = out.find("assistant").expect("role seed frame");
    let call = out.find("get_weather").expect("tool call frame");
    let finish = out
        .find("finish_reason\\\":\\\"tool_calls")
        .expect("finish reason");
    let done = out.rfind("[DONE]").expect("done marker");
    assert!(role < call);
    assert!(call < done);
    assert!(finish < done);
    assert!(out.contains("city"));
    assert!(out.contains("total_tokens"));

    // The signature landed in the tool bucket for this model.
    let entry = cache
        .get_signature(None, "gemini-2.5-pro", true)
        .expect("signature cached");
    assert_eq!(entry.signature.as_ref(), "SIG1");
}

#[test]
fn claude_stream_orders_thinking_before_text_blocks() {
    let mut parser = SseParser::new(
        ToolNameRegistry::new(),
        "gemini-2.5-pro",
        cache(),
        CacheHints::default(),
        None,
    );
    let mut writer = ClaudeWriter::new("gemini-2.5-pro", false);

    let transcript = [
        json!({"response": {"candidates": [{"content": {"parts": [
            {"thought": true, "text": "let me think"}
        ]}}]}}),
        json!({"response": {"candidates": [{"content": {"parts": [
            {"text": "hello"}
        ]}}]}}),
        json!({"response": {"candidates": [{"finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 2, "candidatesTokenCount": 2, "totalTokenCount": 4}}}),
    ];

    let mut frames = Vec::new();
    for chunk in transcript {
        for event in parser.feed(&frame(chunk)) {
            frames.extend(writer.on_event(&event));
        }
    }
    frames.extend(parser.finish().iter().flat_map(|event| writer.on_event(event)));
    frames.extend(writer.finish());

    let out = rendered(&frames);
    let start = out.find("message_start").expect("message_start");
    let thinking = out.find("thinking_delta").expect("thinking block");
    let text = out.find("text_delta").expect("text block");
    let delta = out.find("message_delta").expect("message_delta");
    let stop = out.find("message_stop").expect("message_stop");
    assert!(start < thinking);
    assert!(thinking < text);
    assert!(text < delta);
    assert!(delta < stop);
    assert!(out.contains("end_turn"));
}

/// Stream-to-non-stream equivalence: collecting the neutral events of a
/// transcript yields exactly the concatenated text, reasoning, and the full
/// tool-call list.
#[test]
fn fake_non_stream_collects_exactly_what_was_streamed() {
    let mut registry = ToolNameRegistry::new();
    registry.register("lookup");
    let mut parser = SseParser::new(
        registry,
        "gemini-2.5-pro",
        cache(),
        CacheHints {
            has_tools: true,
            is_image_model: false,
        },
        None,
    );

    let transcript = [
        json!({"response": {"candidates": [{"content": {"parts": [{"thought": true, "text": "a"}]}}]}}),
        json!({"response": {"candidates": [{"content": {"parts": [{"text": "Hello"}]}}]}}),
        json!({"response": {"candidates": [{"content": {"parts": [{"thought": true, "text": "b"}]}}]}}),
        json!({"response": {"candidates": [{"content": {"parts": [{"text": ", world"}]}}]}}),
        json!({"response": {"candidates": [{"content": {"parts": [
            {"functionCall": {"name": "lookup", "args": {"q": 1}}}
        ]}}]}}),
        json!({"response": {"candidates": [{"finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 1, "candidatesTokenCount": 2, "totalTokenCount": 3}}}),
    ];

    let mut collector = StreamCollector::new();
    for chunk in transcript {
        for event in parser.feed(&frame(chunk)) {
            collector.absorb(event);
        }
    }
    for event in parser.finish() {
        collector.absorb(event);
    }

    assert_eq!(collector.content, "Hello, world");
    assert_eq!(collector.reasoning, "ab");
    assert_eq!(collector.tool_calls.len(), 1);
    assert_eq!(collector.tool_calls[0].name, "lookup");
    assert_eq!(collector.usage.unwrap().total_tokens, 3);

    let body = serde_json::to_value(collector.into_openai("gemini-2.5-pro")).unwrap();
    assert_eq!(body["choices"][0]["message"]["content"], "Hello, world");
    assert_eq!(body["choices"][0]["message"]["reasoning_content"], "ab");
    assert_eq!(body["choices"][0]["finish_reason"], "tool_calls");
    assert_eq!(
        body["choices"][0]["message"]["tool_calls"][0]["function"]["name"],
        "lookup"
    );
}

/// Chunk boundaries inside SSE lines must not change the event stream.
#[test]
fn byte_partitioning_is_transparent() {
    let transcript = concat!(
        "data: {\"response\":{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"he\"}]}}]}}\n\n",
        "data: {\"response\":{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"llo\"}]}}]}}\n\n",
        "data: {\"response\":{\"candidates\":[{\"finishReason\":\"STOP\"}]}}\n\n",
    )
    .as_bytes();

    let collect = |cuts: &[usize]| {
        let mut parser = SseParser::new(
            ToolNameRegistry::new(),
            "m",
            cache(),
            CacheHints::default(),
            None,
        );
        let mut collector = StreamCollector::new();
        let mut start = 0;
        for &cut in cuts {
            for event in parser.feed(&transcript[start..cut]) {
                collector.absorb(event);
            }
            start = cut;
        }
        for event in parser.feed(&transcript[start..]) {
            collector.absorb(event);
        }
        for event in parser.finish() {
            collector.absorb(event);
        }
        collector.content
    };

    let whole = collect(&[]);
    assert_eq!(whole, "hello");
    for cuts in [vec![1], vec![10, 11, 12], (1..transcript.len()).collect::<Vec<_>>()] {
        assert_eq!(collect(&cuts), whole, "cuts {cuts:?}");
    }
}

/// Fake-stream replay: a collected non-stream answer replays through a
/// writer as a well-formed SSE sequence.
#[test]
fn fake_stream_replays_collected_answer() {
    let response: castor_schema::gemini::GenerateContentResponse = serde_json::from_value(json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": "A"}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 1, "candidatesTokenCount": 1, "totalTokenCount": 2}
    }))
    .unwrap();

    let collector = StreamCollector::from_response(&response, &ToolNameRegistry::new());
    let events = collector.into_events();
    assert!(matches!(events.first(), Some(StreamEvent::Text(t)) if t == "A"));

    let mut writer = OpenaiWriter::new("假流式/gemini-2.5-pro");
    let mut frames: Vec<_> = events.iter().flat_map(|event| writer.on_event(event)).collect();
    frames.extend(writer.finish());

    let out = rendered(&frames);
    let content = out.find("\\\"content\\\":\\\"A\\\"").expect("content delta");
    let finish = out.find("\\\"stop\\\"").expect("finish_reason stop");
    let done = out.rfind("[DONE]").expect("done marker");
    assert!(content < finish);
    assert!(finish < done);
    assert!(out.contains("total_tokens"));
}
