//! Thought-signature cache.
//!
//! The upstream attaches opaque continuation tokens (`thoughtSignature`) to
//! reasoning and function-call parts, and only accepts multi-turn reasoning
//! requests when prior model turns replay a signature it recognizes.
//! Continuity is per model and per usage bucket: a conversation with tools
//! needs a tool-bucket signature even when thinking is disabled, while plain
//! reasoning turns use the reasoning bucket. Entries are process-local and
//! expire on TTL.

mod cache;
mod recorder;

pub use cache::{CacheHints, GatingPolicy, SigBucket, SignatureCache, SignatureEntry};
pub use recorder::SignatureRecorder;

/// Known upstream bypass accepted in place of a real signature. Last resort
/// only; a cached or per-model default signature always wins.
pub const SENTINEL_SIGNATURE: &str = "skip_thought_signature_validator";
