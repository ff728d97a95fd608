//! willow-graph: the knowledge graph store
//!
//! A tree of typed nodes with cross-links, owned in memory by
//! [`GraphStore`] and mirrored to a JSON snapshot on disk. The store is the
//! single writer; the snapshot is the contract with sub-agent processes and
//! with the version-control layer in `willow-vcs`.
//!
//! # Structure
//!
//! - [`model`] - nodes, links, relations, temporal validity, the graph
//! - [`store`] - the lock-guarded owner and all mutations
//! - [`search`] - ranked substring search
//! - [`walk`] - per-step views for the `walk_graph` navigation tool
//! - [`snapshot`] - atomic snapshot reads and writes

pub mod error;
pub mod model;
pub mod search;
pub mod snapshot;
pub mod store;
pub mod walk;

pub use error::{GraphError, Result};
pub use model::{
    Graph, Link, LinkId, Node, NodeId, NodeType, Relation, Revision, Temporal,
};
pub use search::SearchHit;
pub use store::{ContextView, DeleteReport, GraphStore};
pub use walk::{LinkDirection, WalkChild, WalkGlance, WalkLink, WalkPosition, WalkView};
