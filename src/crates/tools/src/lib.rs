//! willow-tools: the agent-facing tool surface
//!
//! Eight tools over the graph store, validated from one table, scoped per
//! agent role, wrapped in MCP-style text responses. Unknown tool names are
//! the only protocol-level error (JSON-RPC -32601); everything else comes
//! back as a response with `isError` set.

pub mod dispatch;
pub mod error;
pub mod policy;
pub mod schema;

pub use dispatch::{ContentBlock, ToolHandler, ToolResponse};
pub use error::{ToolError, METHOD_NOT_FOUND};
pub use policy::AgentRole;
pub use schema::{spec, ToolSpec, WalkAction, TOOLS};
