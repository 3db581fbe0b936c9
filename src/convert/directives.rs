use super::genconfig::ThinkingDirective;

/// Feature flags smuggled through the model name (CLI dialect only).
/// Prefixes and suffixes are stripped; `model` is what the upstream sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDirectives {
    pub model: String,
    /// `假流式/` — serve the client a stream replayed from a non-stream call.
    pub fake_stream: bool,
    /// `流式抗截断/` — anti-truncation hint; pins the upstream call to
    /// streaming.
    pub anti_truncation: bool,
    /// `-maxthinking` / `-nothinking`.
    pub thinking: Option<ThinkingDirective>,
    /// `-search` — append a `googleSearch` tool.
    pub search: bool,
}

const FAKE_STREAM_PREFIX: &str = "假流式/";
const ANTI_TRUNCATION_PREFIX: &str = "流式抗截断/";
const MAX_THINKING_SUFFIX: &str = "-maxthinking";
const NO_THINKING_SUFFIX: &str = "-nothinking";
const SEARCH_SUFFIX: &str = "-search";

/// Strip recognized feature prefixes/suffixes from a requested model name.
pub fn parse_model_directives(raw: &str) -> ModelDirectives {
    let mut model = raw;
    let mut fake_stream = false;
    let mut anti_truncation = false;

    loop {
        if let Some(rest) = model.strip_prefix(FAKE_STREAM_PREFIX) {
            fake_stream = true;
            model = rest;
        } else if let Some(rest) = model.strip_prefix(ANTI_TRUNCATION_PREFIX) {
            anti_truncation = true;
            model = rest;
        } else {
            break;
        }
    }

    let mut thinking = None;
    let mut search = false;
    loop {
        if let Some(rest) = model.strip_suffix(MAX_THINKING_SUFFIX) {
            thinking = Some(ThinkingDirective::Max);
            model = rest;
        } else if let Some(rest) = model.strip_suffix(NO_THINKING_SUFFIX) {
            thinking = Some(ThinkingDirective::Off);
            model = rest;
        } else if let Some(rest) = model.strip_suffix(SEARCH_SUFFIX) {
            search = true;
            model = rest;
        } else {
            break;
        }
    }

    ModelDirectives {
        model: model.to_string(),
        fake_stream,
        anti_truncation,
        thinking,
        search,
    }
}

/// A model name without any recognized flags (Antigravity dialects, where
/// feature prefixes are not honored).
pub fn plain_model(raw: &str) -> ModelDirectives {
    ModelDirectives {
        model: raw.to_string(),
        fake_stream: false,
        anti_truncation: false,
        thinking: None,
        search: false,
    }
}
