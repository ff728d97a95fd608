//! Core data model: nodes, links, and the graph itself
//!
//! The graph is a tree of typed nodes (every node except the root has a
//! parent) plus a set of cross-links independent of the tree. Nodes and
//! links are kept in arenas keyed by id; all edges are id references, never
//! owning pointers, so views are cheap to clone and lookups are O(1).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

/// Unique identifier of a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        NodeId(s.to_string())
    }
}

/// Unique identifier of a link
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkId(pub String);

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for LinkId {
    fn from(s: &str) -> Self {
        LinkId(s.to_string())
    }
}

/// The six node types, ordered from most to least structural
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Category,
    Collection,
    Entity,
    Attribute,
    Event,
    Detail,
}

impl NodeType {
    /// All node types, in search-priority order
    pub const ALL: [NodeType; 6] = [
        NodeType::Category,
        NodeType::Collection,
        NodeType::Entity,
        NodeType::Attribute,
        NodeType::Event,
        NodeType::Detail,
    ];

    /// Parse from the wire string form
    pub fn parse(s: &str) -> Option<NodeType> {
        match s {
            "category" => Some(NodeType::Category),
            "collection" => Some(NodeType::Collection),
            "entity" => Some(NodeType::Entity),
            "attribute" => Some(NodeType::Attribute),
            "event" => Some(NodeType::Event),
            "detail" => Some(NodeType::Detail),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Category => "category",
            NodeType::Collection => "collection",
            NodeType::Entity => "entity",
            NodeType::Attribute => "attribute",
            NodeType::Event => "event",
            NodeType::Detail => "detail",
        }
    }

    /// Search ranking priority; lower sorts first
    pub fn priority(&self) -> u8 {
        match self {
            NodeType::Category => 0,
            NodeType::Collection => 1,
            NodeType::Entity => 2,
            NodeType::Attribute => 3,
            NodeType::Event => 4,
            NodeType::Detail => 5,
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Canonical link relations. Any other relation string is rejected at the
/// tool boundary; a closed set prevents uncontrolled proliferation under
/// agent improvisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    RelatedTo,
    Contradicts,
    CausedBy,
    LeadsTo,
    DependsOn,
    SimilarTo,
    PartOf,
    ExampleOf,
    DerivedFrom,
}

impl Relation {
    /// The canonical relation set, in documentation order
    pub const CANONICAL: [Relation; 9] = [
        Relation::RelatedTo,
        Relation::Contradicts,
        Relation::CausedBy,
        Relation::LeadsTo,
        Relation::DependsOn,
        Relation::SimilarTo,
        Relation::PartOf,
        Relation::ExampleOf,
        Relation::DerivedFrom,
    ];

    pub fn parse(s: &str) -> Option<Relation> {
        match s {
            "related_to" => Some(Relation::RelatedTo),
            "contradicts" => Some(Relation::Contradicts),
            "caused_by" => Some(Relation::CausedBy),
            "leads_to" => Some(Relation::LeadsTo),
            "depends_on" => Some(Relation::DependsOn),
            "similar_to" => Some(Relation::SimilarTo),
            "part_of" => Some(Relation::PartOf),
            "example_of" => Some(Relation::ExampleOf),
            "derived_from" => Some(Relation::DerivedFrom),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Relation::RelatedTo => "related_to",
            Relation::Contradicts => "contradicts",
            Relation::CausedBy => "caused_by",
            Relation::LeadsTo => "leads_to",
            Relation::DependsOn => "depends_on",
            Relation::SimilarTo => "similar_to",
            Relation::PartOf => "part_of",
            Relation::ExampleOf => "example_of",
            Relation::DerivedFrom => "derived_from",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Temporal validity attached to a node. Values are kept as the caller
/// supplied them (ISO-8601 or free text); ordering and expiry checks only
/// apply when both ends parse as instants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Temporal {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// Best-effort parse of a temporal bound: RFC 3339 first, then a bare date.
pub fn parse_instant(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    None
}

impl Temporal {
    /// True when both bounds parse as instants and are inverted.
    pub fn is_inverted(&self) -> bool {
        match (&self.valid_from, &self.valid_until) {
            (Some(from), Some(until)) => match (parse_instant(from), parse_instant(until)) {
                (Some(f), Some(u)) => f > u,
                _ => false,
            },
            _ => false,
        }
    }

    /// True when `valid_until` parses as an instant in the past.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.valid_until
            .as_deref()
            .and_then(parse_instant)
            .map(|until| until < now)
            .unwrap_or(false)
    }
}

/// A superseded content value, kept in the node's append-only history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub superseded_at: DateTime<Utc>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// A typed vertex in the knowledge tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub node_type: NodeType,
    /// Free text holding one atomic fact
    pub content: String,
    /// Only the root lacks a parent
    pub parent_id: Option<NodeId>,
    /// Ordered child ids; the tree edge set
    pub children: Vec<NodeId>,
    /// Short key/value annotations; conventionally `source_type`,
    /// `source_id`, `confidence`
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temporal: Option<Temporal>,
    /// Prior content values, most recent last
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Revision>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A typed cross-edge independent of the tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub id: LinkId,
    pub from_node: NodeId,
    pub to_node: NodeId,
    pub relation: Relation,
    #[serde(default, skip_serializing_if = "is_false")]
    pub bidirectional: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// The whole graph: one root, a node arena, a link arena.
///
/// This struct is plain data; all mutation goes through
/// [`GraphStore`](crate::store::GraphStore), which enforces the invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub root_id: NodeId,
    pub nodes: HashMap<NodeId, Node>,
    pub links: HashMap<LinkId, Link>,
}

impl Graph {
    /// The id given to the root node of a fresh graph
    pub const ROOT_ID: &'static str = "root";

    /// A new graph holding only the root node
    pub fn new() -> Graph {
        let now = Utc::now();
        let root_id = NodeId(Graph::ROOT_ID.to_string());
        let root = Node {
            id: root_id.clone(),
            node_type: NodeType::Category,
            content: "Memory".to_string(),
            parent_id: None,
            children: Vec::new(),
            metadata: BTreeMap::new(),
            temporal: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), root);
        Graph {
            root_id,
            nodes,
            links: HashMap::new(),
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Ancestor chain of a node, nearest parent first, root last.
    /// Stops early on a dangling parent reference.
    pub fn ancestors_of(&self, id: &NodeId) -> Vec<&Node> {
        let mut out = Vec::new();
        let mut current = self.nodes.get(id).and_then(|n| n.parent_id.as_ref());
        while let Some(pid) = current {
            match self.nodes.get(pid) {
                Some(parent) => {
                    out.push(parent);
                    current = parent.parent_id.as_ref();
                }
                None => break,
            }
        }
        out
    }

    /// Distance from the root along parent edges; `None` for unknown nodes.
    pub fn depth_of(&self, id: &NodeId) -> Option<usize> {
        if !self.nodes.contains_key(id) {
            return None;
        }
        Some(self.ancestors_of(id).len())
    }

    /// True when `id` is `ancestor` or lies inside its subtree.
    pub fn is_within(&self, id: &NodeId, ancestor: &NodeId) -> bool {
        if id == ancestor {
            return true;
        }
        self.ancestors_of(id).iter().any(|n| &n.id == ancestor)
    }

    /// All ids in the subtree rooted at `id`, including `id` itself.
    pub fn subtree_ids(&self, id: &NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(id.clone());
        while let Some(next) = queue.pop_front() {
            if let Some(node) = self.nodes.get(&next) {
                for child in &node.children {
                    queue.push_back(child.clone());
                }
            }
            out.push(next);
        }
        out
    }

    /// Every node id reachable from the root via `children`.
    pub fn reachable_from_root(&self) -> HashSet<NodeId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(self.root_id.clone());
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(&next) {
                for child in &node.children {
                    queue.push_back(child.clone());
                }
            }
        }
        seen
    }

    /// Check the structural invariants, returning a human-readable list of
    /// violations. An empty result means the graph is sound.
    pub fn verify_invariants(&self) -> Vec<String> {
        let mut violations = Vec::new();

        match self.nodes.get(&self.root_id) {
            None => violations.push(format!("root node '{}' missing", self.root_id)),
            Some(root) => {
                if root.parent_id.is_some() {
                    violations.push("root node has a parent".to_string());
                }
            }
        }

        for node in self.nodes.values() {
            if node.id == self.root_id {
                continue;
            }
            match &node.parent_id {
                None => violations.push(format!("node '{}' has no parent", node.id)),
                Some(pid) => match self.nodes.get(pid) {
                    None => violations.push(format!(
                        "node '{}' references missing parent '{}'",
                        node.id, pid
                    )),
                    Some(parent) => {
                        if !parent.children.contains(&node.id) {
                            violations.push(format!(
                                "parent '{}' does not list child '{}'",
                                pid, node.id
                            ));
                        }
                    }
                },
            }
        }

        let reachable = self.reachable_from_root();
        for id in self.nodes.keys() {
            if !reachable.contains(id) {
                violations.push(format!("node '{}' unreachable from root", id));
            }
        }

        for link in self.links.values() {
            if link.from_node == link.to_node {
                violations.push(format!("link '{}' is a self-link", link.id));
            }
            if !self.nodes.contains_key(&link.from_node) {
                violations.push(format!(
                    "link '{}' references missing node '{}'",
                    link.id, link.from_node
                ));
            }
            if !self.nodes.contains_key(&link.to_node) {
                violations.push(format!(
                    "link '{}' references missing node '{}'",
                    link.id, link.to_node
                ));
            }
        }

        for node in self.nodes.values() {
            if let Some(temporal) = &node.temporal {
                if temporal.is_inverted() {
                    violations.push(format!("node '{}' has an inverted temporal range", node.id));
                }
            }
        }

        violations
    }
}

impl Default for Graph {
    fn default() -> Self {
        Graph::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_type_parse_round_trip() {
        for nt in NodeType::ALL {
            assert_eq!(NodeType::parse(nt.as_str()), Some(nt));
        }
        assert_eq!(NodeType::parse("folder"), None);
    }

    #[test]
    fn test_relation_parse_round_trip() {
        for rel in Relation::CANONICAL {
            assert_eq!(Relation::parse(rel.as_str()), Some(rel));
        }
        assert_eq!(Relation::parse("knows"), None);
    }

    #[test]
    fn test_temporal_inversion() {
        let ok = Temporal {
            valid_from: Some("2020-01-01".to_string()),
            valid_until: Some("2023-06-01".to_string()),
            label: None,
        };
        assert!(!ok.is_inverted());

        let inverted = Temporal {
            valid_from: Some("2023-06-01".to_string()),
            valid_until: Some("2020-01-01".to_string()),
            label: None,
        };
        assert!(inverted.is_inverted());

        // Free-form bounds cannot be ordered, so they are accepted.
        let freeform = Temporal {
            valid_from: Some("university years".to_string()),
            valid_until: Some("recently".to_string()),
            label: None,
        };
        assert!(!freeform.is_inverted());
    }

    #[test]
    fn test_temporal_expiry() {
        let now = Utc::now();
        let expired = Temporal {
            valid_from: None,
            valid_until: Some("2001-01-01".to_string()),
            label: None,
        };
        assert!(expired.is_expired(now));

        let open_ended = Temporal {
            valid_from: Some("2001-01-01".to_string()),
            valid_until: None,
            label: None,
        };
        assert!(!open_ended.is_expired(now));
    }

    #[test]
    fn test_new_graph_is_sound() {
        let graph = Graph::new();
        assert_eq!(graph.node_count(), 1);
        assert!(graph.verify_invariants().is_empty());
    }

    #[test]
    fn test_snapshot_field_names() {
        let graph = Graph::new();
        let value = serde_json::to_value(&graph).unwrap();
        assert!(value.get("root_id").is_some());
        assert!(value.get("nodes").is_some());
        assert!(value.get("links").is_some());
        let root = &value["nodes"]["root"];
        assert_eq!(root["node_type"], "category");
        assert_eq!(root["parent_id"], serde_json::Value::Null);
    }
}
