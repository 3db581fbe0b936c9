mod claude;
mod gemini;
mod openai;

pub use claude::ClaudeWriter;
pub use gemini::GeminiWriter;
pub(crate) use gemini::usage_metadata as gemini_usage_metadata;
pub use openai::OpenaiWriter;

use super::events::StreamEvent;
use crate::error::CastorError;
use axum::response::sse::Event;

/// Per-dialect SSE serializer. Writers are small state machines: they own
/// frame ordering (role seeding, block open/close) but never reorder the
/// neutral events they are fed.
pub trait DialectWriter: Send + 'static {
    fn on_event(&mut self, event: &StreamEvent) -> Vec<Event>;

    /// Upstream byte stream ended. Emits whatever closes the dialect stream
    /// (terminator frames, synthesized finish when the upstream died early).
    fn finish(&mut self) -> Vec<Event>;

    /// Headers are already sent; surface the error as dialect-shaped frames
    /// and terminate.
    fn on_error(&mut self, error: &CastorError) -> Vec<Event>;
}

pub(super) fn json_event(payload: &impl serde::Serialize) -> Event {
    Event::default()
        .json_data(payload)
        .expect("stream frame serialization cannot fail")
}
