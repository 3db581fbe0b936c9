//! Typed Gemini wire schema shared by every dialect converter.
//!
//! The upstream request/response bodies are parsed into real structs instead
//! of `serde_json::Value` so converters get compile-time access to the fields
//! they rewrite (parts, signatures, generation config), while `extra`
//! catch-all maps preserve anything we do not model for transparent
//! pass-through.

mod model_list;
mod request;
mod response;

pub use model_list::{GeminiModel, GeminiModelList};
pub use request::{
    Content, FunctionDeclaration, GenerateContentRequest, GenerationConfig, Part, Tool,
};
pub use response::{Candidate, GenerateContentResponse, UsageMetadata};
