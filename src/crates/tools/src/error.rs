//! Error types for the tool surface

use thiserror::Error;

/// JSON-RPC error code for an unknown method/tool
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Errors that escape the tool response envelope. Validation failures do
/// not: those come back as a response with `isError` set. Only a name
/// outside the tool table is a protocol-level error.
#[derive(Debug, Error)]
pub enum ToolError {
    /// Tool name not in the table; maps to JSON-RPC -32601
    #[error("Unknown tool '{0}'")]
    UnknownTool(String),
}
