use castor_schema::gemini::UsageMetadata;

/// Neutral event stream produced by the SSE parser and consumed by the
/// per-dialect writers. This is the boundary that keeps writers ignorant of
/// the upstream wire format.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Text(String),
    Reasoning {
        text: String,
        signature: Option<String>,
    },
    /// Buffered function calls, flushed together when the upstream reports a
    /// finish reason.
    ToolCalls(Vec<ToolCallEvent>),
    Usage(UsageEvent),
    Done { finish_reason: FinishReason },
}

#[derive(Debug, Clone)]
pub struct ToolCallEvent {
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object.
    pub args_json: String,
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UsageEvent {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl From<UsageMetadata> for UsageEvent {
    fn from(metadata: UsageMetadata) -> Self {
        let prompt = metadata.prompt_token_count.unwrap_or(0);
        let completion = metadata
            .candidates_token_count
            .unwrap_or(0)
            .saturating_add(metadata.thoughts_token_count.unwrap_or(0));
        Self {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: metadata
                .total_token_count
                .unwrap_or_else(|| prompt.saturating_add(completion)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    MaxTokens,
    Safety,
    Other(String),
}

impl FinishReason {
    /// Interpret the upstream `finishReason` string, folding in whether the
    /// answer ended on buffered tool calls.
    pub fn from_upstream(raw: &str, has_tool_calls: bool) -> Self {
        if has_tool_calls {
            return FinishReason::ToolCalls;
        }
        match raw {
            "STOP" | "FINISH_REASON_UNSPECIFIED" | "" => FinishReason::Stop,
            "MAX_TOKENS" => FinishReason::MaxTokens,
            "SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST" => FinishReason::Safety,
            other => FinishReason::Other(other.to_string()),
        }
    }

    pub fn as_openai(&self) -> &str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::ToolCalls => "tool_calls",
            FinishReason::MaxTokens => "length",
            FinishReason::Safety => "content_filter",
            FinishReason::Other(_) => "stop",
        }
    }

    pub fn as_claude(&self) -> &str {
        match self {
            FinishReason::Stop => "end_turn",
            FinishReason::ToolCalls => "tool_use",
            FinishReason::MaxTokens => "max_tokens",
            FinishReason::Safety => "end_turn",
            FinishReason::Other(_) => "end_turn",
        }
    }

    pub fn as_gemini(&self) -> String {
        match self {
            FinishReason::Stop => "STOP".to_string(),
            FinishReason::ToolCalls => "STOP".to_string(),
            FinishReason::MaxTokens => "MAX_TOKENS".to_string(),
            FinishReason::Safety => "SAFETY".to_string(),
            FinishReason::Other(raw) => raw.clone(),
        }
    }
}
