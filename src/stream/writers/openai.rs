use super::{DialectWriter, json_event};
use crate::error::{CastorError, OpenaiError};
use crate::stream::events::{StreamEvent, UsageEvent};
use axum::response::sse::Event;
use castor_schema::openai::{
    ChatChunkChoice, ChatCompletionChunk, ChatDelta, ChatUsage, ToolCallDelta,
    ToolCallFunctionDelta,
};
use chrono::Utc;
use uuid::Uuid;

/// OpenAI chunk writer: seeds `role:"assistant"` on the first chunk, then
/// emits content/reasoning/tool-call deltas, a final chunk with
/// `finish_reason` + usage, and the `[DONE]` terminator.
pub struct OpenaiWriter {
    id: String,
    created: i64,
    model: String,
    role_sent: bool,
    done_sent: bool,
    usage: Option<ChatUsage>,
}

impl OpenaiWriter {
    pub fn new(model: &str) -> Self {
        Self {
            id: format!("chatcmpl-{}", Uuid::new_v4().simple()),
            created: Utc::now().timestamp(),
            model: model.to_string(),
            role_sent: false,
            done_sent: false,
            usage: None,
        }
    }

    fn chunk(&self, delta: ChatDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk",
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChatChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage: None,
        }
    }

    fn seed_role(&mut self, frames: &mut Vec<Event>) {
        if self.role_sent {
            return;
        }
        self.role_sent = true;
        frames.push(json_event(&self.chunk(
            ChatDelta {
                role: Some("assistant"),
                ..Default::default()
            },
            None,
        )));
    }
}

impl DialectWriter for OpenaiWriter {
    fn on_event(&mut self, event: &StreamEvent) -> Vec<Event> {
        if self.done_sent {
            return Vec::new();
        }
        let mut frames = Vec::new();
        match event {
            StreamEvent::Text(text) => {
                self.seed_role(&mut frames);
                frames.push(json_event(&self.chunk(
                    ChatDelta {
                        content: Some(text.clone()),
                        ..Default::default()
                    },
                    None,
                )));
            }
            StreamEvent::Reasoning { text, .. } => {
                self.seed_role(&mut frames);
                frames.push(json_event(&self.chunk(
                    ChatDelta {
                        reasoning_content: Some(text.clone()),
                        ..Default::default()
                    },
                    None,
                )));
            }
            StreamEvent::ToolCalls(calls) => {
                self.seed_role(&mut frames);
                let deltas = calls
                    .iter()
                    .enumerate()
                    .map(|(index, call)| ToolCallDelta {
                        index: index as u32,
                        id: Some(call.id.clone()),
                        kind: Some("function"),
                        function: ToolCallFunctionDelta {
                            name: Some(call.name.clone()),
                            arguments: Some(call.args_json.clone()),
                        },
                    })
                    .collect();
                frames.push(json_event(&self.chunk(
                    ChatDelta {
                        tool_calls: Some(deltas),
                        ..Default::default()
                    },
                    None,
                )));
            }
            StreamEvent::Usage(usage) => {
                self.usage = Some(to_chat_usage(*usage));
            }
            StreamEvent::Done { finish_reason } => {
                self.seed_role(&mut frames);
                self.done_sent = true;
                let mut chunk =
                    self.chunk(ChatDelta::default(), Some(finish_reason.as_openai().to_string()));
                chunk.usage = self.usage;
                frames.push(json_event(&chunk));
            }
        }
        frames
    }

    fn finish(&mut self) -> Vec<Event> {
        let mut frames = Vec::new();
        if !self.done_sent {
            self.done_sent = true;
            self.seed_role(&mut frames);
            let mut chunk = self.chunk(ChatDelta::default(), Some("stop".to_string()));
            chunk.usage = self.usage;
            frames.push(json_event(&chunk));
        }
        frames.push(Event::default().data("[DONE]"));
        frames
    }

    fn on_error(&mut self, error: &CastorError) -> Vec<Event> {
        self.done_sent = true;
        vec![
            Event::default().data(OpenaiError::payload_for(error).to_string()),
            Event::default().data("[DONE]"),
        ]
    }
}

fn to_chat_usage(usage: UsageEvent) -> ChatUsage {
    ChatUsage {
        prompt_tokens: usage.prompt_tokens,
        completion_tokens: usage.completion_tokens,
        total_tokens: usage.total_tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::events::{FinishReason, ToolCallEvent};

    fn data_of(event: &Event) -> String {
        // axum's Event has no public accessor; round-trip through Display.
        format!("{event:?}")
    }

    #[test]
    fn first_frame_seeds_assistant_role() {
        let mut writer = OpenaiWriter::new("gemini-2.5-pro");
        let frames = writer.on_event(&StreamEvent::Text("hi".into()));
        assert_eq!(frames.len(), 2);
        assert!(data_of(&frames[0]).contains("assistant"));
        assert!(data_of(&frames[1]).contains("\\\"content\\\":\\\"hi\\\""));
    }

    #[test]
    fn tool_calls_carry_index_and_arguments() {
        let mut writer = OpenaiWriter::new("m");
        let frames = writer.on_event(&StreamEvent::ToolCalls(vec![ToolCallEvent {
            id: "call_1".into(),
            name: "get_weather".into(),
            args_json: "{\"city\":\"BJ\"}".into(),
            signature: None,
        }]));
        let rendered = data_of(frames.last().unwrap());
        assert!(rendered.contains("tool_calls"));
        assert!(rendered.contains("get_weather"));
    }

    #[test]
    fn done_then_finish_yields_single_final_chunk_and_done_marker() {
        let mut writer = OpenaiWriter::new("m");
        writer.on_event(&StreamEvent::Text("x".into()));
        writer.on_event(&StreamEvent::Usage(UsageEvent {
            prompt_tokens: 1,
            completion_tokens: 2,
            total_tokens: 3,
        }));
        let done_frames = writer.on_event(&StreamEvent::Done {
            finish_reason: FinishReason::Stop,
        });
        assert_eq!(done_frames.len(), 1);
        assert!(data_of(&done_frames[0]).contains("finish_reason"));
        assert!(data_of(&done_frames[0]).contains("total_tokens"));

        let finish = writer.finish();
        assert_eq!(finish.len(), 1);
        assert!(data_of(&finish[0]).contains("[DONE]"));
    }

    #[test]
    fn early_eof_synthesizes_stop() {
        let mut writer = OpenaiWriter::new("m");
        writer.on_event(&StreamEvent::Text("partial".into()));
        let finish = writer.finish();
        assert_eq!(finish.len(), 2);
        assert!(data_of(&finish[0]).contains("stop"));
        assert!(data_of(&finish[1]).contains("[DONE]"));
    }
}
