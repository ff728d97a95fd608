//! Tool names, input schemas, and the validation table
//!
//! The tool surface is a closed set: eight tools, each with a typed input
//! struct deserialized from the agent's JSON arguments. Range and
//! membership rules live in one table so the dispatcher, the docs handed
//! to agents, and the tests all read the same source.

use serde::Deserialize;
use std::collections::BTreeMap;
use willow_graph::{search, store, NodeType, Relation, Temporal};

/// One row of the validation table
#[derive(Debug, Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// Mutating tools are the ones role disallow-lists care about most
    pub mutating: bool,
}

/// The complete tool surface
pub const TOOLS: &[ToolSpec] = &[
    ToolSpec {
        name: "search_nodes",
        description: "Ranked substring search over node content and metadata",
        mutating: false,
    },
    ToolSpec {
        name: "get_context",
        description: "A node with its ancestors, nearby descendants, and touching links",
        mutating: false,
    },
    ToolSpec {
        name: "create_node",
        description: "Create a node under an existing parent",
        mutating: true,
    },
    ToolSpec {
        name: "update_node",
        description: "Update a node's content, metadata, or temporal validity",
        mutating: true,
    },
    ToolSpec {
        name: "delete_node",
        description: "Delete a node and its whole subtree",
        mutating: true,
    },
    ToolSpec {
        name: "add_link",
        description: "Add a typed cross-link between two nodes",
        mutating: true,
    },
    ToolSpec {
        name: "delete_link",
        description: "Remove a cross-link",
        mutating: true,
    },
    ToolSpec {
        name: "walk_graph",
        description: "Step through the tree: start, down, up, follow_link, done",
        mutating: false,
    },
];

/// Look up a tool by name.
pub fn spec(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|t| t.name == name)
}

/// Names of every mutating tool.
pub fn mutating_tools() -> Vec<&'static str> {
    TOOLS.iter().filter(|t| t.mutating).map(|t| t.name).collect()
}

/// `search_nodes.maxResults` bounds
pub const MAX_RESULTS_MIN: u32 = 1;
pub const MAX_RESULTS_MAX: u32 = search::MAX_RESULTS as u32;
pub const MAX_RESULTS_DEFAULT: u32 = search::DEFAULT_RESULTS as u32;

/// `get_context.depth` bounds
pub const DEPTH_MIN: u32 = 0;
pub const DEPTH_MAX: u32 = store::MAX_CONTEXT_DEPTH;
pub const DEPTH_DEFAULT: u32 = 2;

/// Temporal validity as agents supply it
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemporalInput {
    #[serde(default)]
    pub valid_from: Option<String>,
    #[serde(default)]
    pub valid_until: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

impl From<TemporalInput> for Temporal {
    fn from(input: TemporalInput) -> Temporal {
        Temporal {
            valid_from: input.valid_from,
            valid_until: input.valid_until,
            label: input.label,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNodeInput {
    pub parent_id: String,
    pub node_type: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub temporal: Option<TemporalInput>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNodeInput {
    pub node_id: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub metadata: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub temporal: Option<TemporalInput>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteNodeInput {
    pub node_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddLinkInput {
    pub from: String,
    pub to: String,
    pub relation: String,
    #[serde(default)]
    pub bidirectional: bool,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteLinkInput {
    pub link_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchNodesInput {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetContextInput {
    pub node_id: String,
    #[serde(default)]
    pub depth: Option<u32>,
}

/// Navigation actions accepted by `walk_graph`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalkAction {
    Start,
    Down,
    Up,
    FollowLink,
    Done,
}

impl WalkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            WalkAction::Start => "start",
            WalkAction::Down => "down",
            WalkAction::Up => "up",
            WalkAction::FollowLink => "follow_link",
            WalkAction::Done => "done",
        }
    }

    /// Actions that must name a node
    pub fn needs_node(&self) -> bool {
        matches!(self, WalkAction::Down | WalkAction::Up | WalkAction::FollowLink)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkGraphInput {
    pub action: WalkAction,
    #[serde(default)]
    pub node_id: Option<String>,
    #[serde(default)]
    pub link_id: Option<String>,
}

/// Error message listing the accepted node types.
pub fn node_type_or_error(raw: &str) -> Result<NodeType, String> {
    NodeType::parse(raw).ok_or_else(|| {
        let accepted: Vec<&str> = NodeType::ALL.iter().map(|t| t.as_str()).collect();
        format!(
            "Invalid nodeType '{raw}'; expected one of: {}",
            accepted.join(", ")
        )
    })
}

/// Error message listing the canonical relations.
pub fn relation_or_error(raw: &str) -> Result<Relation, String> {
    Relation::parse(raw).ok_or_else(|| {
        let accepted: Vec<&str> = Relation::CANONICAL.iter().map(|r| r.as_str()).collect();
        format!(
            "Invalid relation '{raw}'; expected one of: {}",
            accepted.join(", ")
        )
    })
}
