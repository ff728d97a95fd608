//! Walk views: the per-step structure consumed by the `walk_graph` tool
//!
//! A walk view shows an agent where it stands: the path from the root, the
//! children one level down with a glance at grandchildren, and the
//! cross-links it may follow onward.

use crate::error::{GraphError, Result};
use crate::model::{Graph, LinkId, NodeId, NodeType, Relation};
use serde::{Deserialize, Serialize};

/// Grandchild and link-endpoint previews are cut at this many characters
pub const GLANCE_LIMIT: usize = 80;

/// Truncate content for a preview, on a character boundary.
pub fn glance(content: &str) -> String {
    if content.chars().count() <= GLANCE_LIMIT {
        return content.to_string();
    }
    let mut out: String = content.chars().take(GLANCE_LIMIT).collect();
    out.push_str("...");
    out
}

/// Where the walker currently stands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkPosition {
    pub id: NodeId,
    pub content: String,
    pub node_type: NodeType,
}

/// A truncated look at a node one step beyond the frontier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkGlance {
    pub id: NodeId,
    pub content: String,
}

/// A direct child of the current position, with one level of lookahead
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkChild {
    pub id: NodeId,
    pub content: String,
    pub node_type: NodeType,
    pub children: Vec<WalkGlance>,
}

/// Which way a link points relative to the current position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkDirection {
    Outgoing,
    Incoming,
}

/// A link incident on the current position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkLink {
    pub id: LinkId,
    pub relation: Relation,
    pub direction: LinkDirection,
    pub other: WalkGlance,
    /// Traversal is allowed along outgoing or bidirectional links only
    pub can_follow: bool,
}

/// The full view returned for one walk step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkView {
    pub position: WalkPosition,
    /// Ancestors from the root to the target, inclusive
    pub path: Vec<WalkPosition>,
    pub children: Vec<WalkChild>,
    pub links: Vec<WalkLink>,
}

fn position_of(graph: &Graph, id: &NodeId) -> Option<WalkPosition> {
    graph.nodes.get(id).map(|node| WalkPosition {
        id: node.id.clone(),
        content: node.content.clone(),
        node_type: node.node_type,
    })
}

/// Build the walk view for `target`.
pub fn walk_view(graph: &Graph, target: &NodeId) -> Result<WalkView> {
    let node = graph
        .nodes
        .get(target)
        .ok_or_else(|| GraphError::NodeNotFound(target.to_string()))?;

    let mut path: Vec<WalkPosition> = graph
        .ancestors_of(target)
        .iter()
        .filter_map(|ancestor| position_of(graph, &ancestor.id))
        .collect();
    path.reverse();
    path.push(WalkPosition {
        id: node.id.clone(),
        content: node.content.clone(),
        node_type: node.node_type,
    });

    let children = node
        .children
        .iter()
        .filter_map(|child_id| graph.nodes.get(child_id))
        .map(|child| WalkChild {
            id: child.id.clone(),
            content: child.content.clone(),
            node_type: child.node_type,
            children: child
                .children
                .iter()
                .filter_map(|gc_id| graph.nodes.get(gc_id))
                .map(|gc| WalkGlance {
                    id: gc.id.clone(),
                    content: glance(&gc.content),
                })
                .collect(),
        })
        .collect();

    let mut links: Vec<WalkLink> = graph
        .links
        .values()
        .filter(|link| &link.from_node == target || &link.to_node == target)
        .filter_map(|link| {
            let outgoing = &link.from_node == target;
            let other_id = if outgoing {
                &link.to_node
            } else {
                &link.from_node
            };
            let other = graph.nodes.get(other_id)?;
            Some(WalkLink {
                id: link.id.clone(),
                relation: link.relation,
                direction: if outgoing {
                    LinkDirection::Outgoing
                } else {
                    LinkDirection::Incoming
                },
                other: WalkGlance {
                    id: other.id.clone(),
                    content: glance(&other.content),
                },
                can_follow: outgoing || link.bidirectional,
            })
        })
        .collect();
    links.sort_by(|a, b| a.id.0.cmp(&b.id.0));

    Ok(WalkView {
        position: WalkPosition {
            id: node.id.clone(),
            content: node.content.clone(),
            node_type: node.node_type,
        },
        path,
        children,
        links,
    })
}
