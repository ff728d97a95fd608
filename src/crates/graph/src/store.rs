//! The graph store: exclusive owner of the in-memory graph
//!
//! All mutation serializes through this store behind one coarse lock;
//! mutation rate is human-scale, so finer locking buys nothing. Every
//! operation validates completely before touching the graph, so a returned
//! error means no state changed. After each applied mutation the snapshot
//! is rewritten, which is how sub-agent processes observe the graph.

use crate::error::{GraphError, Result};
use crate::model::{Graph, Link, LinkId, Node, NodeId, NodeType, Relation, Revision, Temporal};
use crate::search::{self, SearchHit};
use crate::snapshot;
use crate::walk::{self, WalkView};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Deepest descendant expansion `get_context` will perform
pub const MAX_CONTEXT_DEPTH: u32 = 10;

/// What a cascade delete removed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteReport {
    pub nodes: usize,
    pub links: usize,
}

impl DeleteReport {
    pub fn total(&self) -> usize {
        self.nodes + self.links
    }
}

/// A node with its surroundings, as returned by `get_context`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextView {
    pub node: Node,
    /// Nearest parent first, root last
    pub ancestors: Vec<Node>,
    /// Breadth-limited subtree below the node
    pub descendants: Vec<Node>,
    /// Links touching the node, its ancestors, or the listed descendants
    pub links: Vec<Link>,
}

/// Thread-safe owner of the in-memory graph plus its snapshot path
pub struct GraphStore {
    path: PathBuf,
    graph: RwLock<Graph>,
}

impl GraphStore {
    /// Open the store at `path`, creating a fresh single-root graph (and
    /// writing its snapshot) when no file exists yet.
    pub fn open(path: &Path) -> Result<GraphStore> {
        let graph = if path.exists() {
            snapshot::load(path)?
        } else {
            let graph = Graph::new();
            snapshot::save(path, &graph)?;
            tracing::info!(path = %path.display(), "Created fresh graph snapshot");
            graph
        };
        Ok(GraphStore {
            path: path.to_path_buf(),
            graph: RwLock::new(graph),
        })
    }

    /// Open the store at the default snapshot location (see
    /// [`snapshot::default_path`]).
    pub fn open_default() -> Result<GraphStore> {
        GraphStore::open(&snapshot::default_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Clone of the current graph, for readers that need a consistent view.
    pub fn graph(&self) -> Graph {
        self.graph.read().clone()
    }

    /// Run a closure against the current graph without cloning it.
    pub fn with_graph<R>(&self, f: impl FnOnce(&Graph) -> R) -> R {
        f(&self.graph.read())
    }

    /// Re-read the snapshot from disk, replacing the in-memory graph.
    /// This is how the parent observes mutations written by a sub-agent
    /// process that does not share memory with it.
    pub fn reload(&self) -> Result<()> {
        let fresh = snapshot::load(&self.path)?;
        *self.graph.write() = fresh;
        Ok(())
    }

    /// Replace the in-memory graph and rewrite the snapshot. Used by the
    /// version-control layer for branch switches and discards.
    pub fn replace(&self, graph: Graph) -> Result<()> {
        snapshot::save(&self.path, &graph)?;
        *self.graph.write() = graph;
        Ok(())
    }

    /// Run a mutation against the live graph under the write lock and
    /// rewrite the snapshot. No other writer can interleave between the
    /// mutation and the state it was computed against.
    pub fn update<R>(&self, f: impl FnOnce(&mut Graph) -> R) -> Result<R> {
        let mut graph = self.graph.write();
        let result = f(&mut graph);
        snapshot::save(&self.path, &graph)?;
        Ok(result)
    }

    /// Create a node under an existing parent.
    pub fn create_node(
        &self,
        parent_id: &NodeId,
        node_type: NodeType,
        content: &str,
        metadata: Option<BTreeMap<String, String>>,
        temporal: Option<Temporal>,
    ) -> Result<Node> {
        if let Some(t) = &temporal {
            check_temporal(t)?;
        }

        let mut graph = self.graph.write();
        if !graph.nodes.contains_key(parent_id) {
            return Err(GraphError::ParentNotFound(parent_id.to_string()));
        }

        let now = Utc::now();
        let node = Node {
            id: NodeId(Uuid::new_v4().to_string()),
            node_type,
            content: content.to_string(),
            parent_id: Some(parent_id.clone()),
            children: Vec::new(),
            metadata: metadata.unwrap_or_default(),
            temporal,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        graph
            .nodes
            .get_mut(parent_id)
            .expect("parent checked above")
            .children
            .push(node.id.clone());
        graph.nodes.insert(node.id.clone(), node.clone());
        snapshot::save(&self.path, &graph)?;

        tracing::debug!(node = %node.id, parent = %parent_id, node_type = %node_type, "Node created");
        Ok(node)
    }

    /// Update a node's content, metadata, or temporal validity. A content
    /// change pushes the prior value onto the node's history.
    pub fn update_node(
        &self,
        node_id: &NodeId,
        content: Option<&str>,
        metadata: Option<BTreeMap<String, String>>,
        temporal: Option<Temporal>,
        reason: Option<&str>,
    ) -> Result<Node> {
        if let Some(t) = &temporal {
            check_temporal(t)?;
        }

        let mut graph = self.graph.write();
        let node = graph
            .nodes
            .get_mut(node_id)
            .ok_or_else(|| GraphError::NodeNotFound(node_id.to_string()))?;

        if let Some(new_content) = content {
            if new_content != node.content {
                node.history.push(Revision {
                    content: std::mem::replace(&mut node.content, new_content.to_string()),
                    reason: reason.map(|s| s.to_string()),
                    superseded_at: Utc::now(),
                });
            }
        }
        if let Some(new_metadata) = metadata {
            node.metadata = new_metadata;
        }
        if let Some(new_temporal) = temporal {
            node.temporal = Some(new_temporal);
        }
        node.updated_at = Utc::now();

        let updated = node.clone();
        snapshot::save(&self.path, &graph)?;

        tracing::debug!(node = %node_id, "Node updated");
        Ok(updated)
    }

    /// Delete a node and its whole subtree, dropping every link that
    /// touches anything removed. The root is untouchable.
    pub fn delete_node(&self, node_id: &NodeId) -> Result<DeleteReport> {
        let mut graph = self.graph.write();
        if *node_id == graph.root_id {
            return Err(GraphError::RootDeletion);
        }
        if !graph.nodes.contains_key(node_id) {
            return Err(GraphError::NodeNotFound(node_id.to_string()));
        }

        let doomed: HashSet<NodeId> = graph.subtree_ids(node_id).into_iter().collect();

        if let Some(parent_id) = graph.nodes.get(node_id).and_then(|n| n.parent_id.clone()) {
            if let Some(parent) = graph.nodes.get_mut(&parent_id) {
                parent.children.retain(|c| c != node_id);
            }
        }

        let links_before = graph.links.len();
        graph
            .links
            .retain(|_, link| !doomed.contains(&link.from_node) && !doomed.contains(&link.to_node));
        let links_removed = links_before - graph.links.len();

        for id in &doomed {
            graph.nodes.remove(id);
        }
        snapshot::save(&self.path, &graph)?;

        let report = DeleteReport {
            nodes: doomed.len(),
            links: links_removed,
        };
        tracing::debug!(
            node = %node_id,
            nodes_removed = report.nodes,
            links_removed = report.links,
            "Node deleted with cascade"
        );
        Ok(report)
    }

    /// Add a cross-link between two existing, distinct nodes.
    pub fn add_link(
        &self,
        from: &NodeId,
        to: &NodeId,
        relation: Relation,
        bidirectional: bool,
        confidence: Option<f64>,
    ) -> Result<Link> {
        let mut graph = self.graph.write();
        if from == to {
            return Err(GraphError::SelfLink);
        }
        if !graph.nodes.contains_key(from) {
            return Err(GraphError::NodeNotFound(from.to_string()));
        }
        if !graph.nodes.contains_key(to) {
            return Err(GraphError::NodeNotFound(to.to_string()));
        }
        let duplicate = graph
            .links
            .values()
            .any(|l| &l.from_node == from && &l.to_node == to && l.relation == relation);
        if duplicate {
            return Err(GraphError::DuplicateLink {
                from: from.to_string(),
                to: to.to_string(),
                relation: relation.to_string(),
            });
        }

        let link = Link {
            id: LinkId(Uuid::new_v4().to_string()),
            from_node: from.clone(),
            to_node: to.clone(),
            relation,
            bidirectional,
            confidence,
            created_at: Utc::now(),
        };
        graph.links.insert(link.id.clone(), link.clone());
        snapshot::save(&self.path, &graph)?;

        tracing::debug!(link = %link.id, from = %from, to = %to, relation = %relation, "Link added");
        Ok(link)
    }

    /// Remove a link outright; links carry no history.
    pub fn delete_link(&self, link_id: &LinkId) -> Result<()> {
        let mut graph = self.graph.write();
        if graph.links.remove(link_id).is_none() {
            return Err(GraphError::LinkNotFound(link_id.to_string()));
        }
        snapshot::save(&self.path, &graph)?;
        tracing::debug!(link = %link_id, "Link deleted");
        Ok(())
    }

    /// Ranked substring search; see [`search::search`] for the ordering.
    pub fn search_nodes(&self, query: &str, max_results: usize) -> Vec<SearchHit> {
        search::search(&self.graph.read(), query, max_results)
    }

    /// A node with ancestors, a depth-limited subtree, and touching links.
    pub fn get_context(&self, node_id: &NodeId, depth: u32) -> Result<ContextView> {
        let graph = self.graph.read();
        let node = graph
            .nodes
            .get(node_id)
            .ok_or_else(|| GraphError::NodeNotFound(node_id.to_string()))?
            .clone();

        let ancestors: Vec<Node> = graph
            .ancestors_of(node_id)
            .into_iter()
            .cloned()
            .collect();

        let mut descendants = Vec::new();
        collect_descendants(
            &graph,
            node_id,
            depth.min(MAX_CONTEXT_DEPTH),
            0,
            &mut descendants,
        );

        let mut involved: HashSet<&NodeId> = HashSet::new();
        involved.insert(node_id);
        involved.extend(ancestors.iter().map(|n| &n.id));
        involved.extend(descendants.iter().map(|n| &n.id));

        let mut links: Vec<Link> = graph
            .links
            .values()
            .filter(|l| involved.contains(&l.from_node) || involved.contains(&l.to_node))
            .cloned()
            .collect();
        links.sort_by(|a, b| a.id.0.cmp(&b.id.0));

        Ok(ContextView {
            node,
            ancestors,
            descendants,
            links,
        })
    }

    /// The walk view for `node_id`; see [`walk::walk_view`].
    pub fn walk_view(&self, node_id: &NodeId) -> Result<WalkView> {
        walk::walk_view(&self.graph.read(), node_id)
    }
}

fn check_temporal(temporal: &Temporal) -> Result<()> {
    if temporal.is_inverted() {
        return Err(GraphError::TemporalOrder {
            from: temporal.valid_from.clone().unwrap_or_default(),
            until: temporal.valid_until.clone().unwrap_or_default(),
        });
    }
    Ok(())
}

fn collect_descendants(
    graph: &Graph,
    node_id: &NodeId,
    max_depth: u32,
    current: u32,
    out: &mut Vec<Node>,
) {
    if current >= max_depth {
        return;
    }
    if let Some(node) = graph.nodes.get(node_id) {
        for child_id in &node.children {
            if let Some(child) = graph.nodes.get(child_id) {
                out.push(child.clone());
                collect_descendants(graph, child_id, max_depth, current + 1, out);
            }
        }
    }
}
