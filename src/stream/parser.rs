use super::events::{FinishReason, StreamEvent, ToolCallEvent, UsageEvent};
use super::images::ImageStore;
use super::line_buffer::LineBuffer;
use crate::convert::{ToolNameRegistry, segments};
use castor_schema::codeassist::unwrap_response;
use castor_schema::gemini::Part;
use castor_sigcache::{CacheHints, SignatureCache, SignatureRecorder};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Line-buffered SSE parser over the upstream byte stream, producing the
/// neutral event stream.
///
/// Tool calls are buffered until the upstream reports a finish reason, then
/// flushed as one `ToolCalls` event followed by `Usage` and `Done`. On
/// finish the accumulated reasoning and last-seen signature are recorded
/// into the signature cache.
pub struct SseParser {
    registry: ToolNameRegistry,
    model: String,
    cache: Arc<SignatureCache>,
    hints: CacheHints,
    recorder: SignatureRecorder,
    lines: LineBuffer,
    tool_calls: Vec<ToolCallEvent>,
    last_signature: Option<String>,
    usage: Option<UsageEvent>,
    finished: bool,
    images: Option<ImageStore>,
}

impl SseParser {
    pub fn new(
        registry: ToolNameRegistry,
        model: &str,
        cache: Arc<SignatureCache>,
        hints: CacheHints,
        images: Option<ImageStore>,
    ) -> Self {
        Self {
            registry,
            model: model.to_string(),
            cache,
            hints,
            recorder: SignatureRecorder::new(),
            lines: LineBuffer::new(),
            tool_calls: Vec::new(),
            last_signature: None,
            usage: None,
            finished: false,
            images,
        }
    }

    /// Feed one upstream chunk; returns the events it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for line in self.lines.append(chunk) {
            events.extend(self.feed_line(&line));
        }
        events
    }

    /// Stream ended. Flushes whatever is pending; a missing upstream
    /// `finishReason` degrades to `Done{Stop}` so writers always terminate.
    pub fn finish(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        if let Some(tail) = self.lines.finish() {
            // A final line without trailing newline is still a valid frame.
            events.extend(self.feed_line(&tail));
        }
        if !self.finished {
            events.extend(
                self.close(FinishReason::from_upstream("", !self.tool_calls.is_empty())),
            );
        }
        events
    }

    fn feed_line(&mut self, line: &str) -> Vec<StreamEvent> {
        if self.finished {
            return Vec::new();
        }
        let line = line.trim_end_matches('\r');
        let Some(payload) = line.strip_prefix("data:") else {
            // Comments, event names and blank separator lines.
            return Vec::new();
        };
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            return Vec::new();
        }

        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(e) => {
                warn!("Skipping invalid SSE JSON frame: {e}: {payload:.80}");
                return Vec::new();
            }
        };
        let response = match unwrap_response(value) {
            Ok(response) => response,
            Err(e) => {
                warn!("Skipping unparsable upstream frame: {e}");
                return Vec::new();
            }
        };

        if let Some(metadata) = response.usage_metadata {
            self.usage = Some(metadata.into());
        }

        let mut events = Vec::new();
        let Some(candidate) = response.candidates.first() else {
            return events;
        };

        if let Some(content) = &candidate.content {
            for part in &content.parts {
                events.extend(self.feed_part(part));
            }
        }

        if let Some(reason) = &candidate.finish_reason {
            let reason = FinishReason::from_upstream(reason, !self.tool_calls.is_empty());
            events.extend(self.close(reason));
        }

        events
    }

    fn feed_part(&mut self, part: &Part) -> Vec<StreamEvent> {
        if let Some(signature) = &part.thought_signature {
            self.recorder.observe_signature(signature);
            self.last_signature = Some(signature.clone());
        }

        if let Some(call) = &part.function_call {
            let safe_name = call.get("name").and_then(Value::as_str).unwrap_or_default();
            let args = call
                .get("args")
                .cloned()
                .unwrap_or(Value::Object(Default::default()));
            self.tool_calls.push(ToolCallEvent {
                id: segments::new_call_id(),
                name: self.registry.resolve_original(safe_name),
                args_json: args.to_string(),
                signature: part
                    .thought_signature
                    .clone()
                    .or_else(|| self.last_signature.clone()),
            });
            return Vec::new();
        }

        if part.is_thought() {
            let text = part.text.clone().unwrap_or_default();
            self.recorder.observe_reasoning(&text);
            return vec![StreamEvent::Reasoning {
                text,
                signature: part.thought_signature.clone(),
            }];
        }

        if let Some(text) = &part.text {
            return vec![StreamEvent::Text(text.clone())];
        }

        if let Some(inline) = &part.inline_data {
            let mime_type = inline
                .get("mimeType")
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            let data = inline.get("data").and_then(Value::as_str).unwrap_or("");
            let url = self
                .images
                .as_ref()
                .and_then(|store| store.save(mime_type, data))
                .unwrap_or_else(|| format!("data:{mime_type};base64,{data}"));
            return vec![StreamEvent::Text(format!("![image]({url})"))];
        }

        Vec::new()
    }

    fn close(&mut self, reason: FinishReason) -> Vec<StreamEvent> {
        self.finished = true;

        let mut events = Vec::new();
        if !self.tool_calls.is_empty() {
            events.push(StreamEvent::ToolCalls(std::mem::take(&mut self.tool_calls)));
        }
        if let Some(usage) = self.usage {
            events.push(StreamEvent::Usage(usage));
        }
        events.push(StreamEvent::Done {
            finish_reason: reason,
        });

        let recorder = std::mem::take(&mut self.recorder);
        recorder.flush(&self.cache, None, &self.model, self.hints);
        debug!(model = %self.model, "Upstream stream closed");

        events
    }
}
