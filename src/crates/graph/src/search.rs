//! Substring search over node content and metadata
//!
//! Ranking is deliberate: structural nodes first (category before detail),
//! shallow before deep, short before long. The root is excluded unless it
//! is the only match.

use crate::model::{Graph, NodeId, NodeType};
use serde::{Deserialize, Serialize};

/// Hard cap on results regardless of what the caller asks for
pub const MAX_RESULTS: usize = 50;

/// Default result count when the caller does not specify one
pub const DEFAULT_RESULTS: usize = 10;

/// One search hit, as handed to agents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: NodeId,
    pub node_type: NodeType,
    pub content: String,
    pub depth: usize,
}

/// Case-insensitive substring search against `content` and metadata values.
pub fn search(graph: &Graph, query: &str, max_results: usize) -> Vec<SearchHit> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    let limit = max_results.clamp(1, MAX_RESULTS);

    let mut hits: Vec<SearchHit> = graph
        .nodes
        .values()
        .filter(|node| {
            node.content.to_lowercase().contains(&needle)
                || node
                    .metadata
                    .values()
                    .any(|v| v.to_lowercase().contains(&needle))
        })
        .map(|node| SearchHit {
            id: node.id.clone(),
            node_type: node.node_type,
            content: node.content.clone(),
            depth: graph.depth_of(&node.id).unwrap_or(usize::MAX),
        })
        .collect();

    if hits.len() > 1 {
        hits.retain(|hit| hit.id != graph.root_id);
    }

    hits.sort_by(|a, b| {
        a.node_type
            .priority()
            .cmp(&b.node_type.priority())
            .then(a.depth.cmp(&b.depth))
            .then(a.content.len().cmp(&b.content.len()))
            .then(a.id.0.cmp(&b.id.0))
    });
    hits.truncate(limit);
    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Node, NodeId};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn add_node(graph: &mut Graph, id: &str, parent: &str, node_type: NodeType, content: &str) {
        let now = Utc::now();
        let node = Node {
            id: NodeId::from(id),
            node_type,
            content: content.to_string(),
            parent_id: Some(NodeId::from(parent)),
            children: Vec::new(),
            metadata: BTreeMap::new(),
            temporal: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        graph.nodes.insert(node.id.clone(), node);
        let parent_id = NodeId::from(parent);
        graph
            .nodes
            .get_mut(&parent_id)
            .unwrap()
            .children
            .push(NodeId::from(id));
    }

    #[test]
    fn test_type_priority_breaks_ties() {
        let mut graph = Graph::new();
        add_node(&mut graph, "d", "root", NodeType::Detail, "tea ceremony");
        add_node(&mut graph, "c", "root", NodeType::Category, "tea");

        let hits = search(&graph, "tea", 10);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, NodeId::from("c"));
        assert_eq!(hits[1].id, NodeId::from("d"));
    }

    #[test]
    fn test_depth_breaks_ties_within_type() {
        let mut graph = Graph::new();
        add_node(&mut graph, "shallow", "root", NodeType::Entity, "coffee");
        add_node(&mut graph, "mid", "root", NodeType::Category, "Drinks");
        add_node(&mut graph, "deep", "mid", NodeType::Entity, "coffee");

        let hits = search(&graph, "coffee", 10);
        assert_eq!(hits[0].id, NodeId::from("shallow"));
        assert_eq!(hits[1].id, NodeId::from("deep"));
    }

    #[test]
    fn test_metadata_values_match() {
        let mut graph = Graph::new();
        add_node(&mut graph, "n", "root", NodeType::Entity, "Acme Corp");
        graph
            .nodes
            .get_mut(&NodeId::from("n"))
            .unwrap()
            .metadata
            .insert("source_type".to_string(), "conversation".to_string());

        let hits = search(&graph, "conversation", 10);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_root_excluded_unless_unique() {
        let mut graph = Graph::new();
        // Only the root matches "memory".
        let hits = search(&graph, "memory", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, graph.root_id);

        // Another match appears; the root drops out.
        add_node(&mut graph, "n", "root", NodeType::Detail, "memory palace");
        let hits = search(&graph, "memory", 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, NodeId::from("n"));
    }

    #[test]
    fn test_limit_clamped() {
        let mut graph = Graph::new();
        for i in 0..60 {
            add_node(
                &mut graph,
                &format!("n{i}"),
                "root",
                NodeType::Detail,
                &format!("fact {i}"),
            );
        }
        let hits = search(&graph, "fact", 500);
        assert_eq!(hits.len(), MAX_RESULTS);
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let graph = Graph::new();
        assert!(search(&graph, "   ", 10).is_empty());
    }
}
