//! Role scoping: which tools each sub-agent may touch
//!
//! The disallow-list is authoritative. Prompts may mis-describe a role's
//! powers; the dispatcher enforces this table regardless of wording.

use crate::schema::mutating_tools;
use willow_graph::NodeId;

/// The role a sub-agent was spawned with
#[derive(Debug, Clone, PartialEq)]
pub enum AgentRole {
    /// The user-facing chat agent; reads memory via the coordinator
    Chat,
    /// Navigates the graph to assemble context; strictly read-only
    Search,
    /// Writes new facts after a turn; works from search results, not walks
    Indexer,
    /// Maintenance crawler confined to its assigned subtrees
    Crawler { subtrees: Vec<NodeId> },
    /// Maintenance resolver with mutation authority
    Resolver,
}

impl AgentRole {
    pub fn name(&self) -> &'static str {
        match self {
            AgentRole::Chat => "chat",
            AgentRole::Search => "search",
            AgentRole::Indexer => "indexer",
            AgentRole::Crawler { .. } => "crawler",
            AgentRole::Resolver => "resolver",
        }
    }

    /// Graph tools this role must never call. Passed to the sub-agent CLI
    /// as its disallowed-tools flag and enforced again at dispatch.
    pub fn disallowed_tools(&self) -> Vec<&'static str> {
        match self {
            // Chat reads memory through the coordinator only.
            AgentRole::Chat => {
                let mut list = mutating_tools();
                list.push("walk_graph");
                list
            }
            AgentRole::Search => mutating_tools(),
            AgentRole::Indexer => vec!["walk_graph"],
            // Crawlers observe; delete_node is additionally scope-checked
            // at dispatch for the subtree they were assigned.
            AgentRole::Crawler { .. } => {
                vec!["create_node", "update_node", "add_link", "delete_link"]
            }
            AgentRole::Resolver => Vec::new(),
        }
    }

    /// Whether the sub-agent CLI should also be denied filesystem tools.
    pub fn denies_filesystem(&self) -> bool {
        matches!(self, AgentRole::Indexer)
    }

    pub fn allows(&self, tool: &str) -> bool {
        !self.disallowed_tools().contains(&tool)
    }
}
