use crate::SENTINEL_SIGNATURE;
use moka::sync::Cache;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_TTL_SECS: u64 = 60 * 60;
const DEFAULT_MAX_CAPACITY: u64 = 4096;

/// Which continuity slot a signature belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SigBucket {
    Reasoning,
    Tool,
}

impl SigBucket {
    pub fn for_request(has_tools: bool) -> Self {
        if has_tools {
            SigBucket::Tool
        } else {
            SigBucket::Reasoning
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignatureEntry {
    pub signature: Arc<str>,
    /// Text of the thought the signature was observed on.
    pub content: Arc<str>,
}

/// Which `(bucket, model-kind)` combinations are worth remembering.
#[derive(Debug, Clone, Copy)]
pub struct GatingPolicy {
    pub cache_all: bool,
    pub cache_tool: bool,
    pub cache_image: bool,
    pub cache_thinking: bool,
}

impl Default for GatingPolicy {
    fn default() -> Self {
        Self {
            cache_all: false,
            cache_tool: true,
            cache_image: true,
            cache_thinking: true,
        }
    }
}

/// Context the caller knows about the request the signature came from.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheHints {
    pub has_tools: bool,
    pub is_image_model: bool,
}

impl GatingPolicy {
    /// A combination is admitted when any enabled gate matches it: tool
    /// requests under `cache_tool`, image models under `cache_image`, and
    /// plain reasoning (neither) under `cache_thinking`. The gates are
    /// independent, so a request that is both tool-carrying and on an image
    /// model caches if either gate is on.
    pub fn admits(&self, hints: CacheHints) -> bool {
        if self.cache_all {
            return true;
        }
        (hints.has_tools && self.cache_tool)
            || (hints.is_image_model && self.cache_image)
            || (!hints.has_tools && !hints.is_image_model && self.cache_thinking)
    }
}

/// Process-wide `(model, bucket) -> signature` map.
///
/// A `session_id` is accepted on the API for symmetry with the dialect
/// surface but is not part of the key: continuity is per model.
pub struct SignatureCache {
    entries: Cache<(Arc<str>, SigBucket), SignatureEntry>,
    policy: GatingPolicy,
}

impl SignatureCache {
    pub fn new(policy: GatingPolicy) -> Self {
        Self::with_capacity(policy, DEFAULT_TTL_SECS, DEFAULT_MAX_CAPACITY)
    }

    pub fn with_capacity(policy: GatingPolicy, ttl_secs: u64, max_capacity: u64) -> Self {
        let entries = Cache::builder()
            .time_to_live(Duration::from_secs(ttl_secs.max(1)))
            .max_capacity(max_capacity.max(1))
            .build();
        Self { entries, policy }
    }

    pub fn set_signature(
        &self,
        _session_id: Option<&str>,
        model: &str,
        signature: &str,
        content: &str,
        hints: CacheHints,
    ) {
        if signature.is_empty() || signature == SENTINEL_SIGNATURE {
            return;
        }
        if !self.policy.admits(hints) {
            return;
        }
        let bucket = SigBucket::for_request(hints.has_tools);
        self.entries.insert(
            (Arc::from(model), bucket),
            SignatureEntry {
                signature: Arc::from(signature),
                content: Arc::from(content),
            },
        );
    }

    pub fn get_signature(
        &self,
        _session_id: Option<&str>,
        model: &str,
        has_tools: bool,
    ) -> Option<SignatureEntry> {
        let bucket = SigBucket::for_request(has_tools);
        self.entries.get(&(Arc::from(model), bucket))
    }

    /// Drop every entry; used by tests and config reloads.
    pub fn clear(&self) {
        self.entries.invalidate_all();
    }
}
