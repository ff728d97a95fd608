//! Incremental parser from sub-agent stdout lines to stream events
//!
//! Accumulation is keyed by content-block index, which is what upholds the
//! ordering guarantee: `tool_call_start` for an id always precedes its
//! single `tool_call_args`, no matter how the child interleaves deltas
//! across blocks. Tool-call ids are prefixed `<agent_name>__` so multiple
//! agents can share one event stream without colliding.

use crate::protocol::{ChildBlock, ChildDelta, ChildEvent, ChildUserBlock};
use serde_json::Value;
use std::collections::HashMap;
use willow_stream::StreamEvent;

/// A completed tool call as recorded for the caller
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedToolCall {
    pub id: String,
    pub name: String,
    pub args: Value,
}

enum BlockState {
    Text,
    Thinking,
    ToolUse {
        id: String,
        name: String,
        partial_json: String,
    },
}

/// Stateful parser for one sub-agent's stdout
pub struct EventParser {
    agent_name: String,
    blocks: HashMap<u32, BlockState>,
    text: String,
    tool_calls: Vec<RecordedToolCall>,
}

impl EventParser {
    pub fn new(agent_name: impl Into<String>) -> EventParser {
        EventParser {
            agent_name: agent_name.into(),
            blocks: HashMap::new(),
            text: String::new(),
            tool_calls: Vec::new(),
        }
    }

    fn prefixed(&self, id: &str) -> String {
        format!("{}__{}", self.agent_name, id)
    }

    /// Parse one stdout line. Lines that are not valid protocol JSON are
    /// dropped; a sub-agent printing noise must not break the stream.
    pub fn feed_line(&mut self, line: &str) -> Vec<StreamEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Vec::new();
        }
        match serde_json::from_str::<ChildEvent>(trimmed) {
            Ok(event) => self.apply(event),
            Err(_) => {
                tracing::trace!(agent = %self.agent_name, "Dropped non-protocol line");
                Vec::new()
            }
        }
    }

    fn apply(&mut self, event: ChildEvent) -> Vec<StreamEvent> {
        match event {
            ChildEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                ChildBlock::Text { text } => {
                    self.blocks.insert(index, BlockState::Text);
                    if text.is_empty() {
                        Vec::new()
                    } else {
                        self.text.push_str(&text);
                        vec![StreamEvent::Content { text }]
                    }
                }
                ChildBlock::ToolUse { id, name } => {
                    let id = self.prefixed(&id);
                    self.blocks.insert(
                        index,
                        BlockState::ToolUse {
                            id: id.clone(),
                            name: name.clone(),
                            partial_json: String::new(),
                        },
                    );
                    vec![StreamEvent::ToolCallStart { id, name }]
                }
                ChildBlock::Thinking {} => {
                    self.blocks.insert(index, BlockState::Thinking);
                    vec![StreamEvent::ThinkingStart]
                }
            },
            ChildEvent::ContentBlockDelta { index, delta } => {
                match (self.blocks.get_mut(&index), delta) {
                    (Some(BlockState::Text), ChildDelta::TextDelta { text }) => {
                        self.text.push_str(&text);
                        vec![StreamEvent::Content { text }]
                    }
                    (
                        Some(BlockState::ToolUse { partial_json, .. }),
                        ChildDelta::InputJsonDelta { partial_json: part },
                    ) => {
                        partial_json.push_str(&part);
                        Vec::new()
                    }
                    (Some(BlockState::Thinking), ChildDelta::ThinkingDelta { thinking }) => {
                        vec![StreamEvent::ThinkingDelta { text: thinking }]
                    }
                    // A delta for an unopened or mismatched block is dropped.
                    _ => Vec::new(),
                }
            }
            ChildEvent::ContentBlockStop { index } => match self.blocks.remove(&index) {
                Some(BlockState::ToolUse {
                    id,
                    name,
                    partial_json,
                }) => {
                    let args = if partial_json.trim().is_empty() {
                        Value::Object(Default::default())
                    } else {
                        serde_json::from_str(&partial_json)
                            .unwrap_or(Value::String(partial_json))
                    };
                    self.tool_calls.push(RecordedToolCall {
                        id: id.clone(),
                        name,
                        args: args.clone(),
                    });
                    vec![StreamEvent::ToolCallArgs { id, args }]
                }
                _ => Vec::new(),
            },
            ChildEvent::User { message } => message
                .content
                .into_iter()
                .filter_map(|block| match block {
                    ChildUserBlock::ToolResult {
                        tool_use_id,
                        content,
                    } => Some(StreamEvent::ToolResult {
                        id: self.prefixed(&tool_use_id),
                        result: content,
                    }),
                    ChildUserBlock::Other => None,
                })
                .collect(),
            ChildEvent::Other => Vec::new(),
        }
    }

    /// Assistant text accumulated so far
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Consume the parser, yielding the transcript and recorded tool calls.
    pub fn finish(self) -> (String, Vec<RecordedToolCall>) {
        (self.text, self.tool_calls)
    }
}
