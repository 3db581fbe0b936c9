use super::events::{FinishReason, StreamEvent, ToolCallEvent, UsageEvent};
use crate::convert::{Segment, ToolNameRegistry, parts_to_segments};
use castor_schema::claude::{ClaudeUsage, MessagesResponse, ResponseBlock};
use castor_schema::gemini::GenerateContentResponse;
use castor_schema::openai::{
    ChatChoice, ChatCompletion, ChatResponseMessage, ChatUsage, ToolCall, ToolCallFunction,
};
use chrono::Utc;
use serde_json::{Value, json};
use uuid::Uuid;

/// Accumulated view of one model answer. Feeds every non-stream body and
/// both fake modes:
/// - fake-non-stream: absorb a live event stream, emit one JSON body;
/// - fake-stream: build from a non-stream response, replay as events.
#[derive(Debug, Default)]
pub struct StreamCollector {
    pub content: String,
    pub reasoning: String,
    pub reasoning_signature: Option<String>,
    pub tool_calls: Vec<ToolCallEvent>,
    pub usage: Option<UsageEvent>,
    pub finish: Option<FinishReason>,
}

impl StreamCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn absorb(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Text(text) => self.content.push_str(&text),
            StreamEvent::Reasoning { text, signature } => {
                self.reasoning.push_str(&text);
                if signature.is_some() {
                    self.reasoning_signature = signature;
                }
            }
            StreamEvent::ToolCalls(calls) => self.tool_calls.extend(calls),
            StreamEvent::Usage(usage) => self.usage = Some(usage),
            StreamEvent::Done { finish_reason } => self.finish = Some(finish_reason),
        }
    }

    /// Build from a non-stream upstream response.
    pub fn from_response(
        response: &GenerateContentResponse,
        registry: &ToolNameRegistry,
    ) -> Self {
        let mut collector = Self::new();

        if let Some(candidate) = response.primary() {
            let segments = candidate
                .content
                .as_ref()
                .map(|content| parts_to_segments(&content.parts, registry))
                .unwrap_or_default();
            for segment in segments {
                match segment {
                    Segment::Text(text) => collector.content.push_str(&text),
                    Segment::Reasoning { text, signature } => {
                        collector.reasoning.push_str(&text);
                        if signature.is_some() {
                            collector.reasoning_signature = signature;
                        }
                    }
                    Segment::ToolCall {
                        id,
                        name,
                        args,
                        signature,
                    } => collector.tool_calls.push(ToolCallEvent {
                        id,
                        name,
                        args_json: args.to_string(),
                        signature,
                    }),
                    Segment::InlineData { mime_type, data } => {
                        collector
                            .content
                            .push_str(&format!("![image](data:{mime_type};base64,{data})"));
                    }
                }
            }

            collector.finish = Some(FinishReason::from_upstream(
                candidate.finish_reason.as_deref().unwrap_or(""),
                !collector.tool_calls.is_empty(),
            ));
        }

        collector.usage = response.usage_metadata.map(Into::into);
        collector
    }

    fn finish_reason(&self) -> FinishReason {
        self.finish.clone().unwrap_or_else(|| {
            FinishReason::from_upstream("", !self.tool_calls.is_empty())
        })
    }

    /// Replay as the neutral event stream (fake-stream mode).
    pub fn into_events(self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if !self.reasoning.is_empty() {
            events.push(StreamEvent::Reasoning {
                text: self.reasoning.clone(),
                signature: self.reasoning_signature.clone(),
            });
        }
        if !self.content.is_empty() {
            events.push(StreamEvent::Text(self.content.clone()));
        }
        let finish_reason = self.finish_reason();
        if !self.tool_calls.is_empty() {
            events.push(StreamEvent::ToolCalls(self.tool_calls));
        }
        if let Some(usage) = self.usage {
            events.push(StreamEvent::Usage(usage));
        }
        events.push(StreamEvent::Done { finish_reason });
        events
    }

    // ---- dialect bodies ----

    pub fn into_openai(self, model: &str) -> ChatCompletion {
        let finish = self.finish_reason();
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .iter()
            .map(|call| ToolCall {
                id: call.id.clone(),
                kind: "function".to_string(),
                function: ToolCallFunction {
                    name: call.name.clone(),
                    arguments: call.args_json.clone(),
                },
            })
            .collect();

        ChatCompletion {
            id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
            object: "chat.completion",
            created: Utc::now().timestamp(),
            model: model.to_string(),
            choices: vec![ChatChoice {
                index: 0,
                message: ChatResponseMessage {
                    role: "assistant",
                    content: Some(self.content),
                    reasoning_content: (!self.reasoning.is_empty()).then_some(self.reasoning),
                    tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
                },
                finish_reason: Some(finish.as_openai().to_string()),
            }],
            usage: self.usage.map(|usage| ChatUsage {
                prompt_tokens: usage.prompt_tokens,
                completion_tokens: usage.completion_tokens,
                total_tokens: usage.total_tokens,
            }),
        }
    }

    pub fn into_claude(self, model: &str, pass_signature: bool) -> MessagesResponse {
        let finish = self.finish_reason();
        let mut content = Vec::new();
        if !self.reasoning.is_empty() {
            content.push(ResponseBlock::Thinking {
                thinking: self.reasoning,
                signature: self
                    .reasoning_signature
                    .filter(|_| pass_signature),
            });
        }
        if !self.content.is_empty() {
            content.push(ResponseBlock::Text { text: self.content });
        }
        for call in &self.tool_calls {
            content.push(ResponseBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: serde_json::from_str(&call.args_json).unwrap_or(json!({})),
            });
        }

        let usage = self.usage.unwrap_or_default();
        MessagesResponse {
            id: format!("msg_{}", Uuid::new_v4().simple()),
            kind: "message",
            role: "assistant",
            model: model.to_string(),
            content,
            stop_reason: Some(finish.as_claude().to_string()),
            stop_sequence: None,
            usage: ClaudeUsage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        }
    }

    pub fn into_gemini(self, model: &str, pass_signature: bool) -> Value {
        let finish = self.finish_reason();
        let mut parts = Vec::new();
        if !self.reasoning.is_empty() {
            let mut part = json!({"thought": true, "text": self.reasoning});
            if pass_signature
                && let Some(signature) = &self.reasoning_signature
            {
                part["thoughtSignature"] = Value::String(signature.clone());
            }
            parts.push(part);
        }
        if !self.content.is_empty() {
            parts.push(json!({"text": self.content}));
        }
        for call in &self.tool_calls {
            let args: Value = serde_json::from_str(&call.args_json).unwrap_or(json!({}));
            parts.push(json!({"functionCall": {"name": call.name, "args": args}}));
        }

        let mut body = json!({
            "candidates": [{
                "content": {"role": "model", "parts": parts},
                "finishReason": finish.as_gemini(),
                "index": 0
            }],
            "modelVersion": model,
        });
        if let Some(usage) = self.usage {
            body["usageMetadata"] = super::writers::gemini_usage_metadata(usage);
        }
        body
    }
}
