//! The sub-agent stdout wire protocol
//!
//! A sub-agent emits newline-delimited JSON in the Anthropic streaming
//! shape: content blocks opened by `content_block_start`, grown by typed
//! deltas, closed by `content_block_stop`, plus top-level `user` messages
//! carrying `tool_result` blocks. Anything else on stdout is ignored.

use serde::Deserialize;
use serde_json::Value;

/// One top-level line of sub-agent output
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChildEvent {
    ContentBlockStart {
        index: u32,
        content_block: ChildBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: ChildDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    User {
        message: ChildUserMessage,
    },
    /// Unmodelled event kinds (message_start, ping, ...) are skipped
    #[serde(other)]
    Other,
}

/// The opening shape of a content block
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChildBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    Thinking {},
}

/// Incremental growth of an open block
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChildDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
}

/// A `user` message wrapping tool results
#[derive(Debug, Clone, Deserialize)]
pub struct ChildUserMessage {
    #[serde(default)]
    pub content: Vec<ChildUserBlock>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChildUserBlock {
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Value,
    },
    #[serde(other)]
    Other,
}
