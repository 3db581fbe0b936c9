use super::DialectWriter;
use crate::error::{CastorError, ClaudeError};
use crate::stream::events::{StreamEvent, UsageEvent};
use axum::response::sse::Event;
use serde_json::{Value, json};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    None,
    Thinking,
    Text,
}

/// Anthropic Messages stream writer.
///
/// Frame grammar: `message_start`, then one
/// `content_block_start`/`_delta`/`_stop` triplet per logical block, then
/// `message_delta` with `stop_reason` + usage, then `message_stop`. At most
/// one of thinking/text is open at a time; tool_use blocks emit their input
/// as a single `input_json_delta`.
pub struct ClaudeWriter {
    model: String,
    message_id: String,
    pass_signature: bool,
    started: bool,
    open: OpenBlock,
    block_index: usize,
    pending_signature: Option<String>,
    usage: Option<UsageEvent>,
    done_sent: bool,
}

impl ClaudeWriter {
    pub fn new(model: &str, pass_signature: bool) -> Self {
        Self {
            model: model.to_string(),
            message_id: format!("msg_{}", Uuid::new_v4().simple()),
            pass_signature,
            started: false,
            open: OpenBlock::None,
            block_index: 0,
            pending_signature: None,
            usage: None,
            done_sent: false,
        }
    }

    fn typed(name: &'static str, payload: Value) -> Event {
        Event::default()
            .event(name)
            .json_data(payload)
            .expect("stream frame serialization cannot fail")
    }

    fn ensure_started(&mut self, frames: &mut Vec<Event>) {
        if self.started {
            return;
        }
        self.started = true;
        frames.push(Self::typed(
            "message_start",
            json!({
                "type": "message_start",
                "message": {
                    "id": self.message_id,
                    "type": "message",
                    "role": "assistant",
                    "model": self.model,
                    "content": [],
                    "stop_reason": null,
                    "stop_sequence": null,
                    "usage": {"input_tokens": 0, "output_tokens": 0}
                }
            }),
        ));
    }

    fn close_open_block(&mut self, frames: &mut Vec<Event>) {
        if self.open == OpenBlock::None {
            return;
        }
        if self.open == OpenBlock::Thinking
            && self.pass_signature
            && let Some(signature) = self.pending_signature.take()
        {
            frames.push(Self::typed(
                "content_block_delta",
                json!({
                    "type": "content_block_delta",
                    "index": self.block_index,
                    "delta": {"type": "signature_delta", "signature": signature}
                }),
            ));
        }
        frames.push(Self::typed(
            "content_block_stop",
            json!({"type": "content_block_stop", "index": self.block_index}),
        ));
        self.block_index += 1;
        self.open = OpenBlock::None;
        self.pending_signature = None;
    }

    fn open_block(&mut self, frames: &mut Vec<Event>, kind: OpenBlock, start: Value) {
        frames.push(Self::typed(
            "content_block_start",
            json!({
                "type": "content_block_start",
                "index": self.block_index,
                "content_block": start
            }),
        ));
        self.open = kind;
    }
}

impl DialectWriter for ClaudeWriter {
    fn on_event(&mut self, event: &StreamEvent) -> Vec<Event> {
        if self.done_sent {
            return Vec::new();
        }
        let mut frames = Vec::new();
        self.ensure_started(&mut frames);

        match event {
            StreamEvent::Reasoning { text, signature } => {
                if self.open == OpenBlock::Text {
                    self.close_open_block(&mut frames);
                }
                if self.open == OpenBlock::None {
                    self.open_block(
                        &mut frames,
                        OpenBlock::Thinking,
                        json!({"type": "thinking", "thinking": ""}),
                    );
                }
                if let Some(signature) = signature {
                    self.pending_signature = Some(signature.clone());
                }
                frames.push(Self::typed(
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": self.block_index,
                        "delta": {"type": "thinking_delta", "thinking": text}
                    }),
                ));
            }
            StreamEvent::Text(text) => {
                if self.open == OpenBlock::Thinking {
                    self.close_open_block(&mut frames);
                }
                if self.open == OpenBlock::None {
                    self.open_block(
                        &mut frames,
                        OpenBlock::Text,
                        json!({"type": "text", "text": ""}),
                    );
                }
                frames.push(Self::typed(
                    "content_block_delta",
                    json!({
                        "type": "content_block_delta",
                        "index": self.block_index,
                        "delta": {"type": "text_delta", "text": text}
                    }),
                ));
            }
            StreamEvent::ToolCalls(calls) => {
                self.close_open_block(&mut frames);
                for call in calls {
                    self.open_block(
                        &mut frames,
                        OpenBlock::None,
                        json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": {}
                        }),
                    );
                    frames.push(Self::typed(
                        "content_block_delta",
                        json!({
                            "type": "content_block_delta",
                            "index": self.block_index,
                            "delta": {"type": "input_json_delta", "partial_json": call.args_json}
                        }),
                    ));
                    frames.push(Self::typed(
                        "content_block_stop",
                        json!({"type": "content_block_stop", "index": self.block_index}),
                    ));
                    self.block_index += 1;
                }
                self.open = OpenBlock::None;
            }
            StreamEvent::Usage(usage) => {
                self.usage = Some(*usage);
            }
            StreamEvent::Done { finish_reason } => {
                self.close_open_block(&mut frames);
                self.done_sent = true;
                let usage = self.usage.unwrap_or_default();
                frames.push(Self::typed(
                    "message_delta",
                    json!({
                        "type": "message_delta",
                        "delta": {
                            "stop_reason": finish_reason.as_claude(),
                            "stop_sequence": null
                        },
                        "usage": {
                            "input_tokens": usage.prompt_tokens,
                            "output_tokens": usage.completion_tokens
                        }
                    }),
                ));
                frames.push(Self::typed("message_stop", json!({"type": "message_stop"})));
            }
        }
        frames
    }

    fn finish(&mut self) -> Vec<Event> {
        if self.done_sent {
            return Vec::new();
        }
        self.on_event(&StreamEvent::Done {
            finish_reason: crate::stream::events::FinishReason::Stop,
        })
    }

    fn on_error(&mut self, error: &CastorError) -> Vec<Event> {
        self.done_sent = true;
        vec![Self::typed("error", ClaudeError::payload_for(error))]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::events::{FinishReason, ToolCallEvent};

    fn rendered(frames: &[Event]) -> String {
        format!("{frames:?}")
    }

    fn run(writer: &mut ClaudeWriter, events: &[StreamEvent]) -> String {
        let mut frames = Vec::new();
        for event in events {
            frames.extend(writer.on_event(event));
        }
        frames.extend(writer.finish());
        rendered(&frames)
    }

    #[test]
    fn thinking_then_text_closes_thinking_first() {
        let mut writer = ClaudeWriter::new("m", false);
        let out = run(
            &mut writer,
            &[
                StreamEvent::Reasoning {
                    text: "mm".into(),
                    signature: None,
                },
                StreamEvent::Text("hi".into()),
                StreamEvent::Done {
                    finish_reason: FinishReason::Stop,
                },
            ],
        );

        let start = out.find("message_start").unwrap();
        let thinking = out.find("thinking_delta").unwrap();
        let first_stop = out.find("content_block_stop").unwrap();
        let text = out.find("text_delta").unwrap();
        let message_stop = out.find("message_stop").unwrap();
        assert!(start < thinking);
        assert!(thinking < first_stop);
        assert!(first_stop < text);
        assert!(text < message_stop);
        assert!(out.contains("end_turn"));
    }

    #[test]
    fn tool_use_emits_full_input_json_delta() {
        let mut writer = ClaudeWriter::new("m", false);
        let out = run(
            &mut writer,
            &[
                StreamEvent::ToolCalls(vec![ToolCallEvent {
                    id: "toolu_1".into(),
                    name: "get_weather".into(),
                    args_json: "{\"city\":\"BJ\"}".into(),
                    signature: None,
                }]),
                StreamEvent::Done {
                    finish_reason: FinishReason::ToolCalls,
                },
            ],
        );
        assert!(out.contains("tool_use"));
        assert!(out.contains("input_json_delta"));
        assert!(out.contains("partial_json"));
        assert!(out.contains("\\\"tool_use\\\""));
    }

    #[test]
    fn signature_delta_only_when_enabled() {
        let events = [
            StreamEvent::Reasoning {
                text: "mm".into(),
                signature: Some("SIG".into()),
            },
            StreamEvent::Done {
                finish_reason: FinishReason::Stop,
            },
        ];

        let mut hidden = ClaudeWriter::new("m", false);
        assert!(!run(&mut hidden, &events).contains("signature_delta"));

        let mut shown = ClaudeWriter::new("m", true);
        let out = run(&mut shown, &events);
        assert!(out.contains("signature_delta"));
        assert!(out.contains("SIG"));
    }

    #[test]
    fn early_eof_still_closes_message() {
        let mut writer = ClaudeWriter::new("m", false);
        writer.on_event(&StreamEvent::Text("partial".into()));
        let out = rendered(&writer.finish());
        assert!(out.contains("message_delta"));
        assert!(out.contains("message_stop"));
    }
}
