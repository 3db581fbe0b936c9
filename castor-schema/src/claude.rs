//! Anthropic Messages dialect types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Deserialize)]
pub struct MessagesRequest {
    pub model: String,

    #[serde(default)]
    pub messages: Vec<ClaudeMessage>,

    #[serde(default)]
    pub system: Option<ClaudeSystem>,

    #[serde(default)]
    pub max_tokens: Option<u32>,

    #[serde(default)]
    pub stream: bool,

    #[serde(default)]
    pub temperature: Option<f64>,

    #[serde(default)]
    pub top_p: Option<f64>,

    #[serde(default)]
    pub top_k: Option<i64>,

    #[serde(default)]
    pub tools: Option<Vec<ClaudeTool>>,

    #[serde(default)]
    pub tool_choice: Option<Value>,

    #[serde(default)]
    pub thinking: Option<ThinkingParam>,

    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// `system` is a plain string or a list of text blocks.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClaudeSystem {
    Text(String),
    Blocks(Vec<ClaudeSystemBlock>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeSystemBlock {
    #[serde(default)]
    pub text: String,
}

impl ClaudeSystem {
    pub fn joined_text(&self) -> String {
        match self {
            ClaudeSystem::Text(text) => text.clone(),
            ClaudeSystem::Blocks(blocks) => blocks
                .iter()
                .map(|block| block.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeMessage {
    pub role: String,
    pub content: ClaudeContent,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ClaudeContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// Inbound content block, tagged by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<Value>,
        #[serde(default)]
        is_error: Option<bool>,
    },
    Image {
        source: ImageSource,
    },
    /// Unknown block types parse to this instead of failing the request, so
    /// new client features degrade gracefully.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageSource {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub media_type: Option<String>,

    #[serde(default)]
    pub data: Option<String>,

    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClaudeTool {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub input_schema: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThinkingParam {
    #[serde(rename = "type", default)]
    pub kind: String,

    #[serde(default)]
    pub budget_tokens: Option<i64>,
}

impl ThinkingParam {
    pub fn is_enabled(&self) -> bool {
        self.kind == "enabled"
    }
}

// ---- responses ----

#[derive(Debug, Clone, Serialize)]
pub struct MessagesResponse {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: &'static str,

    pub role: &'static str,
    pub model: String,
    pub content: Vec<ResponseBlock>,
    pub stop_reason: Option<String>,
    pub stop_sequence: Option<String>,
    pub usage: ClaudeUsage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseBlock {
    Text {
        text: String,
    },
    Thinking {
        thinking: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct ClaudeUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}
