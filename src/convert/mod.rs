//! Protocol converter: each public dialect (OpenAI, Claude, Gemini) has a
//! `to_upstream` that produces the shared Gemini request shape plus the
//! request-scoped tool-name registry; responses are parsed once into
//! [`Segment`]s and re-assembled per dialect.

pub mod claude;
pub mod directives;
pub mod genconfig;
pub mod gemini;
pub mod openai;
pub mod segments;
pub mod signatures;
pub mod tools;

pub use directives::{ModelDirectives, parse_model_directives, plain_model};
pub use segments::{Segment, parts_to_segments};
pub use signatures::SignatureResolver;
pub use tools::{ToolNameRegistry, clean_parameters};

use castor_schema::gemini::GenerateContentRequest;

/// A dialect request converted to the upstream shape, plus everything the
/// response path needs to translate back.
pub struct ConvertedRequest {
    pub request: GenerateContentRequest,
    pub tool_names: ToolNameRegistry,
    pub has_tools: bool,
}
