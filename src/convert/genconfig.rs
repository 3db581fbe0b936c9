use castor_schema::gemini::GenerationConfig;
use serde_json::json;

/// Model-name thinking override (`-maxthinking` / `-nothinking`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThinkingDirective {
    Max,
    Off,
}

/// Clamp sampling parameters into the upstream-supported ranges and apply a
/// thinking-budget override when one was requested.
pub fn normalize(config: &mut GenerationConfig, thinking: Option<ThinkingDirective>) {
    if let Some(t) = config.temperature {
        config.temperature = Some(t.clamp(0.0, 2.0));
    }
    if let Some(p) = config.top_p {
        config.top_p = Some(p.clamp(0.0, 1.0));
    }
    if let Some(k) = config.top_k {
        config.top_k = Some(k.max(1));
    }
    if let Some(max) = config.max_output_tokens {
        config.max_output_tokens = Some(max.max(1));
    }

    match thinking {
        Some(ThinkingDirective::Max) => apply_thinking_budget(config, -1),
        Some(ThinkingDirective::Off) => apply_thinking_budget(config, 0),
        None => {}
    }
}

/// Thinking budget semantics: `0` disables thinking, `-1` is unlimited,
/// anything else is the literal token budget.
pub fn apply_thinking_budget(config: &mut GenerationConfig, budget: i64) {
    config.thinking_config = Some(json!({
        "includeThoughts": budget != 0,
        "thinkingBudget": budget,
    }));
}
