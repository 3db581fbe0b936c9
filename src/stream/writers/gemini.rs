use super::{DialectWriter, json_event};
use crate::error::{CastorError, GeminiError};
use crate::stream::events::{StreamEvent, UsageEvent};
use axum::response::sse::Event;
use serde_json::{Value, json};

/// Gemini chunk writer: every neutral event becomes a
/// `candidates[0].content.parts[]` chunk; the final chunk carries
/// `finishReason` and `usageMetadata`.
pub struct GeminiWriter {
    model: String,
    pass_signature: bool,
    usage: Option<UsageEvent>,
    done_sent: bool,
}

impl GeminiWriter {
    pub fn new(model: &str, pass_signature: bool) -> Self {
        Self {
            model: model.to_string(),
            pass_signature,
            usage: None,
            done_sent: false,
        }
    }

    fn parts_chunk(&self, parts: Vec<Value>) -> Value {
        json!({
            "candidates": [{
                "content": {"role": "model", "parts": parts},
                "index": 0
            }],
            "modelVersion": self.model,
        })
    }
}

impl DialectWriter for GeminiWriter {
    fn on_event(&mut self, event: &StreamEvent) -> Vec<Event> {
        if self.done_sent {
            return Vec::new();
        }
        match event {
            StreamEvent::Text(text) => {
                vec![json_event(&self.parts_chunk(vec![json!({"text": text})]))]
            }
            StreamEvent::Reasoning { text, signature } => {
                let mut part = json!({"thought": true, "text": text});
                if self.pass_signature
                    && let Some(signature) = signature
                {
                    part["thoughtSignature"] = Value::String(signature.clone());
                }
                vec![json_event(&self.parts_chunk(vec![part]))]
            }
            StreamEvent::ToolCalls(calls) => {
                let parts = calls
                    .iter()
                    .map(|call| {
                        let args: Value =
                            serde_json::from_str(&call.args_json).unwrap_or(json!({}));
                        let mut part = json!({
                            "functionCall": {"name": call.name, "args": args}
                        });
                        if self.pass_signature
                            && let Some(signature) = &call.signature
                        {
                            part["thoughtSignature"] = Value::String(signature.clone());
                        }
                        part
                    })
                    .collect();
                vec![json_event(&self.parts_chunk(parts))]
            }
            StreamEvent::Usage(usage) => {
                self.usage = Some(*usage);
                Vec::new()
            }
            StreamEvent::Done { finish_reason } => {
                self.done_sent = true;
                let mut chunk = json!({
                    "candidates": [{
                        "content": {"role": "model", "parts": []},
                        "finishReason": finish_reason.as_gemini(),
                        "index": 0
                    }],
                    "modelVersion": self.model,
                });
                if let Some(usage) = self.usage {
                    chunk["usageMetadata"] = usage_metadata(usage);
                }
                vec![json_event(&chunk)]
            }
        }
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
        vec![Event::default().data(GeminiError::payload_for(error).to_string())]
    }
}

pub(crate) fn usage_metadata(usage: UsageEvent) -> Value {
    json!({
        "promptTokenCount": usage.prompt_tokens,
        "candidatesTokenCount": usage.completion_tokens,
        "totalTokenCount": usage.total_tokens,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::events::FinishReason;

    fn rendered(frames: &[Event]) -> String {
        format!("{frames:?}")
    }

    #[test]
    fn text_becomes_candidate_part() {
        let mut writer = GeminiWriter::new("gemini-2.5-pro", false);
        let frames = writer.on_event(&StreamEvent::Text("hi".into()));
        let out = rendered(&frames);
        assert!(out.contains("candidates"));
        assert!(out.contains("\\\"text\\\":\\\"hi\\\""));
    }

    #[test]
    fn signature_is_hidden_unless_configured() {
        let event = StreamEvent::Reasoning {
            text: "mm".into(),
            signature: Some("SIG".into()),
        };

        let mut hidden = GeminiWriter::new("m", false);
        assert!(!rendered(&hidden.on_event(&event)).contains("SIG"));

        let mut shown = GeminiWriter::new("m", true);
        assert!(rendered(&shown.on_event(&event)).contains("SIG"));
    }

    #[test]
    fn final_chunk_has_finish_and_usage() {
        let mut writer = GeminiWriter::new("m", false);
        writer.on_event(&StreamEvent::Usage(UsageEvent {
            prompt_tokens: 1,
            completion_tokens: 2,
            total_tokens: 3,
        }));
        let frames = writer.on_event(&StreamEvent::Done {
            finish_reason: FinishReason::Stop,
        });
        let out = rendered(&frames);
        assert!(out.contains("finishReason"));
        assert!(out.contains("usageMetadata"));
        assert!(writer.finish().is_empty());
    }
}
