use crate::cache::{CacheHints, SignatureCache};

/// Accumulates what a streamed response reveals about its signature so the
/// cache can be updated once, at stream end.
///
/// Streamed chunks interleave reasoning text, the signature itself (usually
/// on the last reasoning or function-call part), and tool calls; none of
/// them alone is enough to decide what to store.
#[derive(Debug, Default)]
pub struct SignatureRecorder {
    reasoning: String,
    signature: Option<String>,
}

impl SignatureRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_reasoning(&mut self, text: &str) {
        self.reasoning.push_str(text);
    }

    pub fn observe_signature(&mut self, signature: &str) {
        if !signature.is_empty() {
            self.signature = Some(signature.to_string());
        }
    }

    /// Store the recorded signature for `(model, bucket)` if one was seen and
    /// the gating policy admits the combination.
    pub fn flush(
        self,
        cache: &SignatureCache,
        session_id: Option<&str>,
        model: &str,
        hints: CacheHints,
    ) {
        let Some(signature) = self.signature else {
            return;
        };
        cache.set_signature(session_id, model, &signature, &self.reasoning, hints);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::GatingPolicy;

    #[test]
    fn flush_stores_accumulated_reasoning_with_last_signature() {
        let cache = SignatureCache::new(GatingPolicy {
            cache_all: true,
            ..Default::default()
        });

        let mut recorder = SignatureRecorder::new();
        recorder.observe_reasoning("alpha ");
        recorder.observe_reasoning("beta");
        recorder.observe_signature("SIG_1");
        recorder.flush(&cache, None, "gemini-2.5-pro", CacheHints::default());

        let entry = cache.get_signature(None, "gemini-2.5-pro", false).unwrap();
        assert_eq!(entry.signature.as_ref(), "SIG_1");
        assert_eq!(entry.content.as_ref(), "alpha beta");
    }

    #[test]
    fn flush_without_signature_stores_nothing() {
        let cache = SignatureCache::new(GatingPolicy {
            cache_all: true,
            ..Default::default()
        });

        let mut recorder = SignatureRecorder::new();
        recorder.observe_reasoning("alpha");
        recorder.flush(&cache, None, "m", CacheHints::default());

        assert!(cache.get_signature(None, "m", false).is_none());
    }
}
