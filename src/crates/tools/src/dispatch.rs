//! Tool dispatch: validate, execute, wrap
//!
//! Every call funnels through [`ToolHandler::call`]: table lookup, role
//! check, typed argument parse, range validation, store operation,
//! response envelope. Successful reads return JSON text; mutations return
//! a one-line acknowledgement. Validation and not-found failures return
//! the same envelope with `isError` set. Only an unknown tool name escapes
//! as a [`ToolError`], which the protocol layer maps to JSON-RPC -32601.

use crate::error::ToolError;
use crate::policy::AgentRole;
use crate::schema::{
    node_type_or_error, relation_or_error, spec, AddLinkInput, CreateNodeInput, DeleteLinkInput,
    DeleteNodeInput, GetContextInput, SearchNodesInput, UpdateNodeInput, WalkAction,
    WalkGraphInput, DEPTH_DEFAULT, DEPTH_MAX, MAX_RESULTS_DEFAULT, MAX_RESULTS_MAX,
    MAX_RESULTS_MIN,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use willow_graph::{GraphStore, LinkId, NodeId, Temporal};

/// One block of a tool response; always text in this protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// The MCP-style response envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub content: Vec<ContentBlock>,
    #[serde(
        rename = "isError",
        default,
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub is_error: bool,
}

impl ToolResponse {
    pub fn text(text: impl Into<String>) -> ToolResponse {
        ToolResponse {
            content: vec![ContentBlock {
                kind: "text".to_string(),
                text: text.into(),
            }],
            is_error: false,
        }
    }

    pub fn json<T: Serialize>(value: &T) -> ToolResponse {
        match serde_json::to_string(value) {
            Ok(text) => ToolResponse::text(text),
            Err(e) => ToolResponse::error(format!("Failed to encode response: {e}")),
        }
    }

    pub fn error(message: impl Into<String>) -> ToolResponse {
        ToolResponse {
            content: vec![ContentBlock {
                kind: "text".to_string(),
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// The first text block, for callers that treat the response as prose.
    pub fn first_text(&self) -> &str {
        self.content.first().map(|b| b.text.as_str()).unwrap_or("")
    }
}

/// Dispatches validated tool calls against the graph store
pub struct ToolHandler {
    store: Arc<GraphStore>,
}

impl ToolHandler {
    pub fn new(store: Arc<GraphStore>) -> ToolHandler {
        ToolHandler { store }
    }

    pub fn store(&self) -> &Arc<GraphStore> {
        &self.store
    }

    /// Execute `name` with `args` under `role`'s authority.
    pub fn call(
        &self,
        role: &AgentRole,
        name: &str,
        args: Value,
    ) -> Result<ToolResponse, ToolError> {
        if spec(name).is_none() {
            return Err(ToolError::UnknownTool(name.to_string()));
        }
        if !role.allows(name) {
            tracing::warn!(role = role.name(), tool = name, "Tool call rejected by role policy");
            return Ok(ToolResponse::error(format!(
                "Tool '{name}' is not available to the {} agent",
                role.name()
            )));
        }

        let response = match name {
            "search_nodes" => self.search_nodes(args),
            "get_context" => self.get_context(args),
            "create_node" => self.create_node(args),
            "update_node" => self.update_node(args),
            "delete_node" => self.delete_node(role, args),
            "add_link" => self.add_link(args),
            "delete_link" => self.delete_link(args),
            "walk_graph" => self.walk_graph(args),
            _ => unreachable!("tool table checked above"),
        };
        if response.is_error {
            tracing::debug!(tool = name, message = response.first_text(), "Tool call failed");
        }
        Ok(response)
    }

    fn search_nodes(&self, args: Value) -> ToolResponse {
        let input: SearchNodesInput = match parse(args) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let max_results = input.max_results.unwrap_or(MAX_RESULTS_DEFAULT);
        if !(MAX_RESULTS_MIN..=MAX_RESULTS_MAX).contains(&max_results) {
            return ToolResponse::error(format!(
                "maxResults must be between {MAX_RESULTS_MIN} and {MAX_RESULTS_MAX}"
            ));
        }
        let hits = self.store.search_nodes(&input.query, max_results as usize);
        ToolResponse::json(&hits)
    }

    fn get_context(&self, args: Value) -> ToolResponse {
        let input: GetContextInput = match parse(args) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let depth = input.depth.unwrap_or(DEPTH_DEFAULT);
        if depth > DEPTH_MAX {
            return ToolResponse::error(format!("depth must be at most {DEPTH_MAX}"));
        }
        match self.store.get_context(&NodeId(input.node_id), depth) {
            Ok(context) => ToolResponse::json(&context),
            Err(e) => ToolResponse::error(e.to_string()),
        }
    }

    fn create_node(&self, args: Value) -> ToolResponse {
        let input: CreateNodeInput = match parse(args) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let node_type = match node_type_or_error(&input.node_type) {
            Ok(t) => t,
            Err(msg) => return ToolResponse::error(msg),
        };
        let temporal: Option<Temporal> = input.temporal.map(Into::into);
        match self.store.create_node(
            &NodeId(input.parent_id.clone()),
            node_type,
            &input.content,
            input.metadata,
            temporal,
        ) {
            Ok(node) => ToolResponse::text(format!(
                "Created {} node {} under {}",
                node.node_type, node.id, input.parent_id
            )),
            Err(e) => ToolResponse::error(e.to_string()),
        }
    }

    fn update_node(&self, args: Value) -> ToolResponse {
        let input: UpdateNodeInput = match parse(args) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let temporal: Option<Temporal> = input.temporal.map(Into::into);
        match self.store.update_node(
            &NodeId(input.node_id.clone()),
            input.content.as_deref(),
            input.metadata,
            temporal,
            input.reason.as_deref(),
        ) {
            Ok(node) => ToolResponse::text(format!("Updated node {}", node.id)),
            Err(e) => ToolResponse::error(e.to_string()),
        }
    }

    fn delete_node(&self, role: &AgentRole, args: Value) -> ToolResponse {
        let input: DeleteNodeInput = match parse(args) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let target = NodeId(input.node_id.clone());

        // A crawler may cascade-delete only inside its assigned subtrees;
        // anything at or above them is out of bounds.
        if let AgentRole::Crawler { subtrees } = role {
            let in_scope = self.store.with_graph(|g| {
                subtrees
                    .iter()
                    .any(|subtree| g.is_within(&target, subtree) && &target != subtree)
            });
            if !in_scope {
                return ToolResponse::error(format!(
                    "Node {target} is outside this crawler's assigned subtrees"
                ));
            }
        }

        match self.store.delete_node(&target) {
            Ok(report) => ToolResponse::text(format!(
                "Deleted {} nodes and {} links under {}",
                report.nodes, report.links, input.node_id
            )),
            Err(e) => ToolResponse::error(e.to_string()),
        }
    }

    fn add_link(&self, args: Value) -> ToolResponse {
        let input: AddLinkInput = match parse(args) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let relation = match relation_or_error(&input.relation) {
            Ok(r) => r,
            Err(msg) => return ToolResponse::error(msg),
        };
        match self.store.add_link(
            &NodeId(input.from),
            &NodeId(input.to),
            relation,
            input.bidirectional,
            input.confidence,
        ) {
            Ok(link) => ToolResponse::text(format!(
                "Linked {} -> {} ({}) as {}",
                link.from_node, link.to_node, link.relation, link.id
            )),
            Err(e) => ToolResponse::error(e.to_string()),
        }
    }

    fn delete_link(&self, args: Value) -> ToolResponse {
        let input: DeleteLinkInput = match parse(args) {
            Ok(v) => v,
            Err(e) => return e,
        };
        match self.store.delete_link(&LinkId(input.link_id.clone())) {
            Ok(()) => ToolResponse::text(format!("Deleted link {}", input.link_id)),
            Err(e) => ToolResponse::error(e.to_string()),
        }
    }

    fn walk_graph(&self, args: Value) -> ToolResponse {
        let input: WalkGraphInput = match parse(args) {
            Ok(v) => v,
            Err(e) => return e,
        };
        let view = match (input.action, input.node_id.map(NodeId)) {
            (WalkAction::Start, _) => {
                let root = self.store.with_graph(|g| g.root_id.clone());
                self.store.walk_view(&root)
            }
            (WalkAction::Done, _) => {
                return ToolResponse::text("Walk complete");
            }
            (action, None) => {
                return ToolResponse::error(format!(
                    "nodeId is required for action '{}'",
                    action.as_str()
                ));
            }
            (WalkAction::Down, Some(node)) => self.store.walk_view(&node),
            (WalkAction::Up, Some(current)) => {
                let parent = self
                    .store
                    .with_graph(|g| g.nodes.get(&current).map(|n| n.parent_id.clone()));
                match parent {
                    None => {
                        return ToolResponse::error(format!("Node '{current}' not found"))
                    }
                    Some(None) => {
                        return ToolResponse::error("Already at the root; cannot go up")
                    }
                    Some(Some(parent_id)) => self.store.walk_view(&parent_id),
                }
            }
            (WalkAction::FollowLink, Some(current)) => {
                let link_id = match input.link_id {
                    Some(id) => LinkId(id),
                    None => {
                        return ToolResponse::error("linkId is required for action 'follow_link'")
                    }
                };
                let target = self.store.with_graph(|g| {
                    let link = g.links.get(&link_id)?;
                    if link.from_node == current {
                        Some((link.to_node.clone(), true, link.bidirectional))
                    } else if link.to_node == current {
                        Some((link.from_node.clone(), false, link.bidirectional))
                    } else {
                        None
                    }
                });
                match target {
                    None => {
                        return ToolResponse::error(format!(
                            "Link '{link_id}' does not touch node '{current}'"
                        ))
                    }
                    Some((_, false, false)) => {
                        return ToolResponse::error(
                            "Only outgoing or bidirectional links can be followed",
                        )
                    }
                    Some((other, _, _)) => self.store.walk_view(&other),
                }
            }
        };

        match view {
            Ok(view) => ToolResponse::json(&view),
            Err(e) => ToolResponse::error(e.to_string()),
        }
    }
}

fn parse<T: for<'de> Deserialize<'de>>(args: Value) -> Result<T, ToolResponse> {
    serde_json::from_value(args).map_err(|e| ToolResponse::error(format!("Invalid arguments: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use willow_graph::{Graph, NodeType, Relation, WalkView};

    fn handler() -> (tempfile::TempDir, ToolHandler) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GraphStore::open(&dir.path().join("graph.json")).unwrap());
        (dir, ToolHandler::new(store))
    }

    fn root() -> NodeId {
        NodeId::from(Graph::ROOT_ID)
    }

    #[test]
    fn test_unknown_tool_is_protocol_error() {
        let (_dir, handler) = handler();
        let err = handler
            .call(&AgentRole::Resolver, "drop_table", json!({}))
            .unwrap_err();
        assert!(matches!(err, ToolError::UnknownTool(_)));
    }

    #[test]
    fn test_role_policy_enforced_at_dispatch() {
        let (_dir, handler) = handler();
        let response = handler
            .call(
                &AgentRole::Search,
                "create_node",
                json!({"parentId": "root", "nodeType": "entity", "content": "X"}),
            )
            .unwrap();
        assert!(response.is_error);
        assert!(response.first_text().contains("search"));
    }

    #[test]
    fn test_create_then_search_round_trip() {
        let (_dir, handler) = handler();
        let response = handler
            .call(
                &AgentRole::Indexer,
                "create_node",
                json!({"parentId": "root", "nodeType": "category", "content": "People"}),
            )
            .unwrap();
        assert!(!response.is_error);
        assert!(response.first_text().starts_with("Created category node"));

        let response = handler
            .call(&AgentRole::Search, "search_nodes", json!({"query": "people"}))
            .unwrap();
        let hits: Vec<serde_json::Value> =
            serde_json::from_str(response.first_text()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["content"], "People");
    }

    #[test]
    fn test_max_results_range_enforced() {
        let (_dir, handler) = handler();
        let response = handler
            .call(
                &AgentRole::Search,
                "search_nodes",
                json!({"query": "x", "maxResults": 51}),
            )
            .unwrap();
        assert!(response.is_error);

        let response = handler
            .call(
                &AgentRole::Search,
                "search_nodes",
                json!({"query": "x", "maxResults": 0}),
            )
            .unwrap();
        assert!(response.is_error);
    }

    #[test]
    fn test_depth_range_enforced() {
        let (_dir, handler) = handler();
        let response = handler
            .call(
                &AgentRole::Search,
                "get_context",
                json!({"nodeId": "root", "depth": 11}),
            )
            .unwrap();
        assert!(response.is_error);
    }

    #[test]
    fn test_non_canonical_relation_rejected() {
        let (_dir, handler) = handler();
        let store = handler.store();
        let a = store
            .create_node(&root(), NodeType::Entity, "A", None, None)
            .unwrap();
        let b = store
            .create_node(&root(), NodeType::Entity, "B", None, None)
            .unwrap();

        let response = handler
            .call(
                &AgentRole::Indexer,
                "add_link",
                json!({"from": a.id.0, "to": b.id.0, "relation": "knows"}),
            )
            .unwrap();
        assert!(response.is_error);
        assert!(response.first_text().contains("related_to"));
    }

    #[test]
    fn test_walk_sequence_down_to_target() {
        let (_dir, handler) = handler();
        let store = handler.store();
        let work = store
            .create_node(&root(), NodeType::Category, "Work", None, None)
            .unwrap();
        let jobs = store
            .create_node(&work.id, NodeType::Collection, "Jobs", None, None)
            .unwrap();
        store
            .create_node(&jobs.id, NodeType::Entity, "Acme Corp (2020-2023)", None, None)
            .unwrap();

        let role = AgentRole::Search;
        let response = handler
            .call(&role, "walk_graph", json!({"action": "start"}))
            .unwrap();
        let view: WalkView = serde_json::from_str(response.first_text()).unwrap();
        assert_eq!(view.position.id, root());
        assert_eq!(view.children.len(), 1);

        let response = handler
            .call(&role, "walk_graph", json!({"action": "down", "nodeId": work.id.0}))
            .unwrap();
        let view: WalkView = serde_json::from_str(response.first_text()).unwrap();
        assert_eq!(view.position.content, "Work");

        let response = handler
            .call(&role, "walk_graph", json!({"action": "down", "nodeId": jobs.id.0}))
            .unwrap();
        let view: WalkView = serde_json::from_str(response.first_text()).unwrap();
        assert_eq!(view.children[0].content, "Acme Corp (2020-2023)");

        let response = handler
            .call(&role, "walk_graph", json!({"action": "done"}))
            .unwrap();
        assert_eq!(response.first_text(), "Walk complete");
    }

    #[test]
    fn test_walk_requires_node_for_movement() {
        let (_dir, handler) = handler();
        let response = handler
            .call(&AgentRole::Search, "walk_graph", json!({"action": "down"}))
            .unwrap();
        assert!(response.is_error);
        assert!(response.first_text().contains("nodeId"));
    }

    #[test]
    fn test_follow_link_respects_direction() {
        let (_dir, handler) = handler();
        let store = handler.store();
        let a = store
            .create_node(&root(), NodeType::Entity, "A", None, None)
            .unwrap();
        let b = store
            .create_node(&root(), NodeType::Entity, "B", None, None)
            .unwrap();
        let link = store
            .add_link(&a.id, &b.id, Relation::LeadsTo, false, None)
            .unwrap();

        let role = AgentRole::Search;
        // Outgoing from A: allowed.
        let response = handler
            .call(
                &role,
                "walk_graph",
                json!({"action": "follow_link", "nodeId": a.id.0, "linkId": link.id.0}),
            )
            .unwrap();
        assert!(!response.is_error);

        // Incoming at B and not bidirectional: refused.
        let response = handler
            .call(
                &role,
                "walk_graph",
                json!({"action": "follow_link", "nodeId": b.id.0, "linkId": link.id.0}),
            )
            .unwrap();
        assert!(response.is_error);
    }

    #[test]
    fn test_crawler_delete_scope() {
        let (_dir, handler) = handler();
        let store = handler.store();
        let work = store
            .create_node(&root(), NodeType::Category, "Work", None, None)
            .unwrap();
        let inside = store
            .create_node(&work.id, NodeType::Detail, "stale fact", None, None)
            .unwrap();
        let outside = store
            .create_node(&root(), NodeType::Category, "Places", None, None)
            .unwrap();

        let role = AgentRole::Crawler {
            subtrees: vec![work.id.clone()],
        };
        let response = handler
            .call(&role, "delete_node", json!({"nodeId": outside.id.0}))
            .unwrap();
        assert!(response.is_error);

        // The subtree root itself is an "ancestor" in scope terms.
        let response = handler
            .call(&role, "delete_node", json!({"nodeId": work.id.0}))
            .unwrap();
        assert!(response.is_error);

        let response = handler
            .call(&role, "delete_node", json!({"nodeId": inside.id.0}))
            .unwrap();
        assert!(!response.is_error);
    }
}
