mod claude;
mod core;
mod gemini;
mod oauth;
mod openai;

pub use claude::ClaudeError;
pub use core::CastorError;
pub use gemini::{GeminiError, GeminiErrorBody, GeminiErrorObject};
pub use oauth::OauthError;
pub use openai::{OpenaiError, OpenaiErrorBody};

pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}
