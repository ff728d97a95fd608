//! Client-facing stream events
//!
//! Every event a client sees during a turn is one of these variants. The
//! wire format is SSE: `event: <name>\ndata: <json>\n\n`; see the [`sse`]
//! module for framing.
//!
//! [`sse`]: crate::sse

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Marker carried by phase events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseMark {
    Start,
    End,
}

/// Which pipeline phase a tool call belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolPhase {
    Search,
    Chat,
    Indexer,
}

/// One event on a conversation stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Assistant text delta
    Content { text: String },
    ThinkingStart,
    ThinkingDelta { text: String },
    /// A tool call opened; `id` is already agent-prefixed
    ToolCallStart { id: String, name: String },
    /// Complete accumulated arguments for a tool call
    ToolCallArgs { id: String, args: Value },
    ToolResult { id: String, result: Value },
    SearchPhase { status: PhaseMark },
    IndexerPhase { status: PhaseMark },
    Title { title: String },
    Error { message: String },
    Done,
}

impl StreamEvent {
    /// The SSE event name
    pub fn name(&self) -> &'static str {
        match self {
            StreamEvent::Content { .. } => "content",
            StreamEvent::ThinkingStart => "thinking_start",
            StreamEvent::ThinkingDelta { .. } => "thinking_delta",
            StreamEvent::ToolCallStart { .. } => "tool_call_start",
            StreamEvent::ToolCallArgs { .. } => "tool_call_args",
            StreamEvent::ToolResult { .. } => "tool_result",
            StreamEvent::SearchPhase { .. } => "search_phase",
            StreamEvent::IndexerPhase { .. } => "indexer_phase",
            StreamEvent::Title { .. } => "title",
            StreamEvent::Error { .. } => "error",
            StreamEvent::Done => "done",
        }
    }

    /// The SSE data payload
    pub fn data(&self) -> Value {
        match self {
            StreamEvent::Content { text } => json!({ "text": text }),
            StreamEvent::ThinkingStart => json!({}),
            StreamEvent::ThinkingDelta { text } => json!({ "text": text }),
            StreamEvent::ToolCallStart { id, name } => json!({ "id": id, "name": name }),
            StreamEvent::ToolCallArgs { id, args } => json!({ "id": id, "args": args }),
            StreamEvent::ToolResult { id, result } => json!({ "id": id, "result": result }),
            StreamEvent::SearchPhase { status } | StreamEvent::IndexerPhase { status } => {
                let label = match status {
                    PhaseMark::Start => "start",
                    PhaseMark::End => "end",
                };
                json!({ "status": label })
            }
            StreamEvent::Title { title } => json!({ "title": title }),
            StreamEvent::Error { message } => json!({ "message": message }),
            StreamEvent::Done => json!({}),
        }
    }

    /// Rebuild an event from an SSE name and data payload.
    pub fn from_parts(name: &str, data: &Value) -> Option<StreamEvent> {
        let text = |v: &Value, key: &str| v.get(key)?.as_str().map(str::to_string);
        match name {
            "content" => Some(StreamEvent::Content {
                text: text(data, "text")?,
            }),
            "thinking_start" => Some(StreamEvent::ThinkingStart),
            "thinking_delta" => Some(StreamEvent::ThinkingDelta {
                text: text(data, "text")?,
            }),
            "tool_call_start" => Some(StreamEvent::ToolCallStart {
                id: text(data, "id")?,
                name: text(data, "name")?,
            }),
            "tool_call_args" => Some(StreamEvent::ToolCallArgs {
                id: text(data, "id")?,
                args: data.get("args").cloned().unwrap_or(Value::Null),
            }),
            "tool_result" => Some(StreamEvent::ToolResult {
                id: text(data, "id")?,
                result: data.get("result").cloned().unwrap_or(Value::Null),
            }),
            "search_phase" => Some(StreamEvent::SearchPhase {
                status: parse_mark(data)?,
            }),
            "indexer_phase" => Some(StreamEvent::IndexerPhase {
                status: parse_mark(data)?,
            }),
            "title" => Some(StreamEvent::Title {
                title: text(data, "title")?,
            }),
            "error" => Some(StreamEvent::Error {
                message: text(data, "message")?,
            }),
            "done" => Some(StreamEvent::Done),
            _ => None,
        }
    }
}

fn parse_mark(data: &Value) -> Option<PhaseMark> {
    match data.get("status")?.as_str()? {
        "start" => Some(PhaseMark::Start),
        "end" => Some(PhaseMark::End),
        _ => None,
    }
}

/// Remove `<tool_call ...>...</tool_call>` spans (and the self-closing
/// form) from assistant text before it is persisted.
pub fn strip_tool_call_xml(text: &str) -> String {
    const OPEN: &str = "<tool_call";
    const CLOSE: &str = "</tool_call>";

    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find(OPEN) {
            None => {
                out.push_str(rest);
                break;
            }
            Some(start) => {
                out.push_str(&rest[..start]);
                let after_open = &rest[start..];
                // Self-closing tag ends at the first "/>"; a paired tag at
                // its closing element. Unterminated markup is dropped.
                let self_close = after_open.find("/>").map(|i| i + 2);
                let paired = after_open.find(CLOSE).map(|i| i + CLOSE.len());
                let end = match (self_close, paired) {
                    (Some(s), Some(p)) => s.min(p),
                    (Some(s), None) => s,
                    (None, Some(p)) => p,
                    (None, None) => {
                        break;
                    }
                };
                rest = &after_open[end..];
            }
        }
    }
    out.trim().to_string()
}
