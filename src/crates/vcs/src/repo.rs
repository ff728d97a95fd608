//! The repository: refs, commit chains, branch operations, merge
//!
//! Branch model is single-writer per branch, last-writer-wins on file
//! state. Metadata lives alongside the snapshot: `vcs/refs.json` maps
//! branch names to head hashes, `vcs/commits/<hash>.json` holds the commit
//! records. The working state is the graph store's in-memory graph plus
//! the shared snapshot file.

use crate::commit::{canonical_json, compute_hash, Commit, CommitHash, CommitInput, CommitSource};
use crate::error::{Result, VcsError};
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use willow_graph::{Graph, GraphStore, LinkId, Node, NodeId};

/// Branch name created by `init`
pub const DEFAULT_BRANCH: &str = "main";

/// Prefix reserved for enrichment-pipeline branches
pub const MAINTENANCE_PREFIX: &str = "maintenance/";

/// Branch-name → head-hash table, persisted as `refs.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Refs {
    current: String,
    branches: BTreeMap<String, CommitHash>,
}

/// The node-id / link-id footprint of the changes between two states
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    pub nodes: HashSet<NodeId>,
    pub links: HashSet<LinkId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.links.is_empty()
    }

    /// True when the two change sets touch no common node or link.
    pub fn is_disjoint(&self, other: &ChangeSet) -> bool {
        self.nodes.is_disjoint(&other.nodes) && self.links.is_disjoint(&other.links)
    }
}

/// Substantive node difference for merge purposes. The `children` list is
/// excluded: tree edges are derived from each child's `parent_id`, so two
/// sides adding siblings under the same parent are not a conflict on the
/// parent. Timestamp-only differences carry no content and are ignored.
fn node_differs(a: &Node, b: &Node) -> bool {
    a.node_type != b.node_type
        || a.content != b.content
        || a.parent_id != b.parent_id
        || a.metadata != b.metadata
        || a.temporal != b.temporal
        || a.history != b.history
}

/// Everything that differs between `base` and `target`, at id granularity.
pub fn diff(base: &Graph, target: &Graph) -> ChangeSet {
    let mut set = ChangeSet::default();
    for (id, node) in &target.nodes {
        match base.nodes.get(id) {
            Some(before) if !node_differs(before, node) => {}
            _ => {
                set.nodes.insert(id.clone());
            }
        }
    }
    for id in base.nodes.keys() {
        if !target.nodes.contains_key(id) {
            set.nodes.insert(id.clone());
        }
    }
    for (id, link) in &target.links {
        if base.links.get(id) != Some(link) {
            set.links.insert(id.clone());
        }
    }
    for id in base.links.keys() {
        if !target.links.contains_key(id) {
            set.links.insert(id.clone());
        }
    }
    set
}

/// Version control over the graph snapshot
pub struct Vcs {
    store: Arc<GraphStore>,
    dir: PathBuf,
    refs: Mutex<Option<Refs>>,
}

impl Vcs {
    /// Attach version control to a graph store. Metadata lives in a `vcs`
    /// directory next to the snapshot; existing refs are loaded eagerly.
    pub fn open(store: Arc<GraphStore>) -> Result<Vcs> {
        let dir = store
            .path()
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join("vcs");
        let refs_path = dir.join("refs.json");
        let refs = if refs_path.exists() {
            let raw = std::fs::read_to_string(&refs_path)?;
            let parsed: Refs = serde_json::from_str(&raw)
                .map_err(|e| VcsError::CorruptMetadata(e.to_string()))?;
            Some(parsed)
        } else {
            None
        };
        Ok(Vcs {
            store,
            dir,
            refs: Mutex::new(refs),
        })
    }

    /// Idempotent init: create `main` with a commit of the current state.
    pub fn init(&self) -> Result<CommitHash> {
        let mut guard = self.refs.lock();
        if let Some(refs) = guard.as_ref() {
            return refs
                .branches
                .get(&refs.current)
                .cloned()
                .ok_or_else(|| VcsError::CorruptMetadata("current branch has no head".into()));
        }

        let state = self.store.graph();
        let commit = self.write_commit(None, "Initial commit", CommitSource::Manual { tool_name: None }, &state)?;
        let refs = Refs {
            current: DEFAULT_BRANCH.to_string(),
            branches: BTreeMap::from([(DEFAULT_BRANCH.to_string(), commit.clone())]),
        };
        self.save_refs(&refs)?;
        *guard = Some(refs);
        tracing::info!(hash = %commit.short(), "Version control initialised");
        Ok(commit)
    }

    pub fn is_initialized(&self) -> bool {
        self.refs.lock().is_some()
    }

    pub fn current_branch(&self) -> Result<String> {
        self.with_refs(|refs| refs.current.clone())
    }

    pub fn branches(&self) -> Result<Vec<String>> {
        self.with_refs(|refs| refs.branches.keys().cloned().collect())
    }

    /// Head hash of a branch.
    pub fn head(&self, branch: &str) -> Result<CommitHash> {
        self.with_refs(|refs| refs.branches.get(branch).cloned())?
            .ok_or_else(|| VcsError::BranchNotFound(branch.to_string()))
    }

    /// Load a commit record by hash.
    pub fn commit_info(&self, hash: &CommitHash) -> Result<Commit> {
        self.load_commit(hash)
    }

    /// Create a branch at the current head. The new branch is not checked
    /// out.
    pub fn create_branch(&self, name: &str) -> Result<()> {
        let mut guard = self.refs.lock();
        let refs = guard.as_mut().ok_or(VcsError::NotInitialized)?;
        if refs.branches.contains_key(name) {
            return Err(VcsError::BranchExists(name.to_string()));
        }
        let head = refs
            .branches
            .get(&refs.current)
            .cloned()
            .ok_or_else(|| VcsError::CorruptMetadata("current branch has no head".into()))?;
        refs.branches.insert(name.to_string(), head);
        self.save_refs(refs)?;
        tracing::debug!(branch = name, "Branch created");
        Ok(())
    }

    /// Check out a branch: its head state becomes the working graph and
    /// the snapshot is rewritten. Last writer wins on file state.
    pub fn switch_branch(&self, name: &str) -> Result<()> {
        let mut guard = self.refs.lock();
        let refs = guard.as_mut().ok_or(VcsError::NotInitialized)?;
        let head = refs
            .branches
            .get(name)
            .cloned()
            .ok_or_else(|| VcsError::BranchNotFound(name.to_string()))?;
        let commit = self.load_commit(&head)?;
        self.store.replace(commit.state)?;
        refs.current = name.to_string();
        self.save_refs(refs)?;
        tracing::info!(branch = name, head = %head.short(), "Switched branch");
        Ok(())
    }

    pub fn delete_branch(&self, name: &str) -> Result<()> {
        let mut guard = self.refs.lock();
        let refs = guard.as_mut().ok_or(VcsError::NotInitialized)?;
        if refs.current == name {
            return Err(VcsError::DeleteCurrentBranch(name.to_string()));
        }
        if refs.branches.remove(name).is_none() {
            return Err(VcsError::BranchNotFound(name.to_string()));
        }
        self.save_refs(refs)?;
        tracing::debug!(branch = name, "Branch deleted");
        Ok(())
    }

    /// True iff the working graph differs from the current branch head.
    pub fn has_pending_changes(&self) -> Result<bool> {
        let branch = self.current_branch()?;
        let head_state = self.load_commit(&self.head(&branch)?)?.state;
        Ok(self.store.graph() != head_state)
    }

    /// Commit the working graph onto the current branch. Returns `None`
    /// when nothing differs from the head.
    pub fn commit(&self, input: CommitInput) -> Result<Option<CommitHash>> {
        let branch = self.current_branch()?;
        let state = self.store.graph();
        self.commit_graph_on(&branch, &state, input)
    }

    /// Re-read the snapshot from disk (a sub-agent process may have
    /// rewritten it), refresh the in-memory graph, and commit the delta
    /// onto the current branch.
    pub fn commit_external_changes(&self, input: CommitInput) -> Result<Option<CommitHash>> {
        self.store.reload()?;
        self.commit(input)
    }

    /// Commit an explicit graph state onto a named branch. This is the
    /// primitive behind `commit` and behind maintenance jobs, which build
    /// their state in an isolated workspace and land it on their own
    /// branch while conversations keep committing to theirs.
    pub fn commit_graph_on(
        &self,
        branch: &str,
        state: &Graph,
        input: CommitInput,
    ) -> Result<Option<CommitHash>> {
        let head = self.head(branch)?;
        let head_state = self.load_commit(&head)?.state;
        if *state == head_state {
            tracing::debug!(branch, "Nothing to commit");
            return Ok(None);
        }

        let commit = self.write_commit(Some(head), &input.message, input.source, state)?;
        let mut guard = self.refs.lock();
        let refs = guard.as_mut().ok_or(VcsError::NotInitialized)?;
        refs.branches.insert(branch.to_string(), commit.clone());
        self.save_refs(refs)?;
        tracing::info!(branch, hash = %commit.short(), message = %input.message, "Committed");
        Ok(Some(commit))
    }

    /// Reset the working graph (and snapshot) to the current branch head.
    pub fn discard_changes(&self) -> Result<()> {
        let branch = self.current_branch()?;
        let head_state = self.load_commit(&self.head(&branch)?)?.state;
        self.store.replace(head_state)?;
        tracing::info!(branch, "Working changes discarded");
        Ok(())
    }

    /// Merge `branch` into the current branch. The side branch's change
    /// set relative to the last common commit must be disjoint, at
    /// node-id (and link-id) granularity, from both the current branch's
    /// committed changes and any uncommitted work sitting in the live
    /// graph; otherwise the merge fails and both branches remain intact.
    /// The merge commit is built from the two committed heads; the side
    /// branch's changes are then overlaid onto the live graph in place,
    /// so a turn's not-yet-committed mutations survive and land in that
    /// turn's own commit. Returns `None` when the side branch brought no
    /// changes.
    pub fn merge_branch(&self, branch: &str) -> Result<Option<CommitHash>> {
        let current = self.current_branch()?;
        let our_head = self.head(&current)?;
        let their_head = self.head(branch)?;

        let base = self
            .common_ancestor(&our_head, &their_head)?
            .ok_or_else(|| VcsError::MergeConflict {
                branch: branch.to_string(),
            })?;
        let base_state = self.load_commit(&base)?.state;
        let our_state = self.load_commit(&our_head)?.state;
        let their_state = self.load_commit(&their_head)?.state;

        let theirs = diff(&base_state, &their_state);
        if theirs.is_empty() {
            tracing::debug!(branch, "Merge is a no-op");
            return Ok(None);
        }
        let ours = diff(&base_state, &our_state);
        if !ours.is_disjoint(&theirs) {
            tracing::warn!(branch, "Merge rejected: overlapping committed changes");
            return Err(VcsError::MergeConflict {
                branch: branch.to_string(),
            });
        }
        // A mid-flight turn's tool calls land in the live graph before
        // that turn's end-of-turn commit runs; its ids conflict the same
        // way committed ones do.
        let pending = diff(&our_state, &self.store.graph());
        if !pending.is_disjoint(&theirs) {
            tracing::warn!(branch, "Merge rejected: overlaps uncommitted work");
            return Err(VcsError::MergeConflict {
                branch: branch.to_string(),
            });
        }

        let mut merged = our_state;
        apply_changes(&mut merged, &their_state, &theirs);

        let input = CommitInput::new(
            format!("Merge branch '{branch}'"),
            CommitSource::Merge {
                source_branch: branch.to_string(),
            },
        );
        let hash = self.commit_graph_on(&current, &merged, input)?;

        // Overlay the side branch's changes onto the live graph under its
        // write lock; uncommitted turn mutations stay in place.
        self.store
            .update(|live| apply_changes(live, &their_state, &theirs))?;
        Ok(hash)
    }

    /// Recent commits on the current branch, newest first.
    pub fn log(&self, limit: usize) -> Result<Vec<Commit>> {
        let branch = self.current_branch()?;
        let mut cursor = Some(self.head(&branch)?);
        let mut out = Vec::new();
        while let Some(hash) = cursor {
            if out.len() >= limit {
                break;
            }
            let commit = self.load_commit(&hash)?;
            cursor = commit.parent.clone();
            out.push(commit);
        }
        Ok(out)
    }

    fn with_refs<R>(&self, f: impl FnOnce(&Refs) -> R) -> Result<R> {
        let guard = self.refs.lock();
        let refs = guard.as_ref().ok_or(VcsError::NotInitialized)?;
        Ok(f(refs))
    }

    fn save_refs(&self, refs: &Refs) -> Result<()> {
        write_json_atomic(&self.dir.join("refs.json"), refs)
    }

    fn commit_path(&self, hash: &CommitHash) -> PathBuf {
        self.dir.join("commits").join(format!("{hash}.json"))
    }

    fn load_commit(&self, hash: &CommitHash) -> Result<Commit> {
        let path = self.commit_path(hash);
        let raw =
            std::fs::read_to_string(&path).map_err(|_| VcsError::MissingCommit(hash.0.clone()))?;
        serde_json::from_str(&raw).map_err(|_| VcsError::MissingCommit(hash.0.clone()))
    }

    fn write_commit(
        &self,
        parent: Option<CommitHash>,
        message: &str,
        source: CommitSource,
        state: &Graph,
    ) -> Result<CommitHash> {
        let timestamp = Utc::now();
        let canonical = canonical_json(state)?;
        let hash = compute_hash(parent.as_ref(), message, timestamp, &canonical);
        let commit = Commit {
            hash: hash.clone(),
            parent,
            message: message.to_string(),
            source,
            timestamp,
            state: state.clone(),
        };
        write_json_atomic(&self.commit_path(&hash), &commit)?;
        Ok(hash)
    }

    /// First commit reachable from both heads, walking parent chains.
    fn common_ancestor(
        &self,
        a: &CommitHash,
        b: &CommitHash,
    ) -> Result<Option<CommitHash>> {
        let mut seen = HashSet::new();
        let mut cursor = Some(a.clone());
        while let Some(hash) = cursor {
            seen.insert(hash.clone());
            cursor = self.load_commit(&hash)?.parent;
        }
        let mut cursor = Some(b.clone());
        while let Some(hash) = cursor {
            if seen.contains(&hash) {
                return Ok(Some(hash));
            }
            cursor = self.load_commit(&hash)?.parent;
        }
        Ok(None)
    }
}

/// Overlay one side's changes onto a state. Only sound when the change
/// sets were verified disjoint. Node fields come from `theirs`; the tree
/// edge lists are repaired afterwards from `parent_id`, so children added
/// on the `onto` side under a shared parent are kept.
fn apply_changes(onto: &mut Graph, theirs: &Graph, changes: &ChangeSet) {
    for id in &changes.nodes {
        match theirs.nodes.get(id) {
            Some(node) => {
                let mut incoming = node.clone();
                if let Some(previous) = onto.nodes.get(id).cloned() {
                    // Reparented: drop the edge from the old parent.
                    if previous.parent_id != incoming.parent_id {
                        if let Some(parent) = previous
                            .parent_id
                            .as_ref()
                            .and_then(|p| onto.nodes.get_mut(p))
                        {
                            parent.children.retain(|c| c != id);
                        }
                    }
                    incoming.children = previous.children;
                }
                onto.nodes.insert(id.clone(), incoming);
            }
            None => {
                if let Some(removed) = onto.nodes.remove(id) {
                    if let Some(parent) =
                        removed.parent_id.and_then(|p| onto.nodes.get_mut(&p))
                    {
                        parent.children.retain(|c| c != id);
                    }
                }
            }
        }
    }
    for id in &changes.links {
        match theirs.links.get(id) {
            Some(link) => {
                onto.links.insert(id.clone(), link.clone());
            }
            None => {
                onto.links.remove(id);
            }
        }
    }
    repair_tree_edges(onto, changes);
}

/// Rebuild tree edges around the applied nodes: every surviving changed
/// node is listed by its parent, and no changed node lists a child that
/// no longer exists.
fn repair_tree_edges(onto: &mut Graph, changes: &ChangeSet) {
    for id in &changes.nodes {
        let parent_id = onto.nodes.get(id).and_then(|n| n.parent_id.clone());
        if let Some(parent_id) = parent_id {
            if let Some(parent) = onto.nodes.get_mut(&parent_id) {
                if !parent.children.contains(id) {
                    parent.children.push(id.clone());
                }
            }
        }
    }
    for id in &changes.nodes {
        let pruned: Option<Vec<NodeId>> = onto.nodes.get(id).map(|node| {
            node.children
                .iter()
                .filter(|child| onto.nodes.contains_key(*child))
                .cloned()
                .collect()
        });
        if let (Some(children), Some(node)) = (pruned, onto.nodes.get_mut(id)) {
            node.children = children;
        }
    }
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;
    let json = serde_json::to_string_pretty(value)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(json.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| VcsError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use willow_graph::NodeType;

    fn fixture() -> (tempfile::TempDir, Arc<GraphStore>, Vcs) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(GraphStore::open(&dir.path().join("graph.json")).unwrap());
        let vcs = Vcs::open(store.clone()).unwrap();
        (dir, store, vcs)
    }

    fn root() -> NodeId {
        NodeId::from(Graph::ROOT_ID)
    }

    fn conversation_input() -> CommitInput {
        CommitInput::new(
            "Turn commit",
            CommitSource::Conversation {
                conversation_id: Some("c1".to_string()),
                summary: None,
            },
        )
    }

    #[test]
    fn test_init_is_idempotent() {
        let (_dir, _store, vcs) = fixture();
        let first = vcs.init().unwrap();
        let second = vcs.init().unwrap();
        assert_eq!(first, second);
        assert_eq!(vcs.current_branch().unwrap(), DEFAULT_BRANCH);
    }

    #[test]
    fn test_commit_returns_none_without_changes() {
        let (_dir, _store, vcs) = fixture();
        vcs.init().unwrap();
        assert!(!vcs.has_pending_changes().unwrap());
        assert!(vcs.commit(conversation_input()).unwrap().is_none());
    }

    #[test]
    fn test_commit_chains_and_logs() {
        let (_dir, store, vcs) = fixture();
        vcs.init().unwrap();

        store
            .create_node(&root(), NodeType::Category, "People", None, None)
            .unwrap();
        assert!(vcs.has_pending_changes().unwrap());
        let first = vcs.commit(conversation_input()).unwrap().unwrap();

        store
            .create_node(&root(), NodeType::Category, "Places", None, None)
            .unwrap();
        let second = vcs.commit(conversation_input()).unwrap().unwrap();
        assert_ne!(first, second);

        let log = vcs.log(10).unwrap();
        assert_eq!(log.len(), 3); // init + two turns
        assert_eq!(log[0].hash, second);
        assert_eq!(log[0].parent.as_ref(), Some(&first));
        assert_eq!(log[0].source.label(), "conversation");
    }

    #[test]
    fn test_discard_restores_head() {
        let (_dir, store, vcs) = fixture();
        vcs.init().unwrap();
        store
            .create_node(&root(), NodeType::Category, "Scratch", None, None)
            .unwrap();
        vcs.discard_changes().unwrap();
        assert_eq!(store.graph().node_count(), 1);
        assert!(!vcs.has_pending_changes().unwrap());
    }

    #[test]
    fn test_switch_branch_swaps_state() {
        let (_dir, store, vcs) = fixture();
        vcs.init().unwrap();

        vcs.create_branch("side").unwrap();
        vcs.switch_branch("side").unwrap();
        store
            .create_node(&root(), NodeType::Category, "SideOnly", None, None)
            .unwrap();
        vcs.commit(CommitInput::new("side work", CommitSource::Manual { tool_name: None }))
            .unwrap()
            .unwrap();

        vcs.switch_branch(DEFAULT_BRANCH).unwrap();
        assert_eq!(store.graph().node_count(), 1);

        vcs.switch_branch("side").unwrap();
        assert_eq!(store.graph().node_count(), 2);
    }

    #[test]
    fn test_delete_current_branch_rejected() {
        let (_dir, _store, vcs) = fixture();
        vcs.init().unwrap();
        assert!(matches!(
            vcs.delete_branch(DEFAULT_BRANCH),
            Err(VcsError::DeleteCurrentBranch(_))
        ));
    }

    #[test]
    fn test_merge_disjoint_changes() {
        let (_dir, store, vcs) = fixture();
        vcs.init().unwrap();

        // Side branch gets its own state built in an isolated workspace.
        vcs.create_branch("maintenance/abc12345").unwrap();
        let mut side_state = store.graph();
        let now = Utc::now();
        let node = willow_graph::Node {
            id: NodeId::from("maint-node"),
            node_type: NodeType::Detail,
            content: "added by maintenance".to_string(),
            parent_id: Some(root()),
            children: Vec::new(),
            metadata: Default::default(),
            temporal: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        side_state
            .nodes
            .get_mut(&root())
            .unwrap()
            .children
            .push(node.id.clone());
        side_state.nodes.insert(node.id.clone(), node);
        vcs.commit_graph_on(
            "maintenance/abc12345",
            &side_state,
            CommitInput::new(
                "Maintenance: manual enrichment (1 actions)",
                CommitSource::Maintenance {
                    job_id: Some("abc12345".to_string()),
                },
            ),
        )
        .unwrap()
        .unwrap();

        // Meanwhile a turn commits on main.
        store
            .create_node(&root(), NodeType::Category, "People", None, None)
            .unwrap();
        vcs.commit(conversation_input()).unwrap().unwrap();

        // Disjoint: the merge lands both sides on main.
        let merged = vcs.merge_branch("maintenance/abc12345").unwrap();
        assert!(merged.is_some());
        let graph = store.graph();
        assert!(graph.nodes.contains_key(&NodeId::from("maint-node")));
        assert!(graph.nodes.values().any(|n| n.content == "People"));
        assert!(graph.verify_invariants().is_empty());

        vcs.delete_branch("maintenance/abc12345").unwrap();
        assert_eq!(vcs.branches().unwrap(), vec![DEFAULT_BRANCH.to_string()]);
    }

    #[test]
    fn test_merge_conflict_leaves_branches_intact() {
        let (_dir, store, vcs) = fixture();
        vcs.init().unwrap();
        let shared = store
            .create_node(&root(), NodeType::Detail, "original", None, None)
            .unwrap();
        vcs.commit(conversation_input()).unwrap().unwrap();

        // Side branch edits the shared node.
        vcs.create_branch("side").unwrap();
        let mut side_state = store.graph();
        side_state.nodes.get_mut(&shared.id).unwrap().content = "side edit".to_string();
        vcs.commit_graph_on(
            "side",
            &side_state,
            CommitInput::new("side", CommitSource::Manual { tool_name: None }),
        )
        .unwrap()
        .unwrap();

        // Main edits the same node.
        store
            .update_node(&shared.id, Some("main edit"), None, None, None)
            .unwrap();
        vcs.commit(conversation_input()).unwrap().unwrap();

        let err = vcs.merge_branch("side").unwrap_err();
        assert!(matches!(err, VcsError::MergeConflict { .. }));

        // Both heads still resolve and hold their own edit.
        let main_state = vcs.commit_info(&vcs.head(DEFAULT_BRANCH).unwrap()).unwrap().state;
        assert_eq!(main_state.nodes[&shared.id].content, "main edit");
        let side_head = vcs.commit_info(&vcs.head("side").unwrap()).unwrap().state;
        assert_eq!(side_head.nodes[&shared.id].content, "side edit");
    }

    #[test]
    fn test_merge_preserves_uncommitted_work() {
        let (_dir, store, vcs) = fixture();
        vcs.init().unwrap();

        vcs.create_branch("maintenance/feedbeef").unwrap();
        let mut side_state = store.graph();
        let now = Utc::now();
        let node = willow_graph::Node {
            id: NodeId::from("maint-node"),
            node_type: NodeType::Detail,
            content: "added by maintenance".to_string(),
            parent_id: Some(root()),
            children: Vec::new(),
            metadata: Default::default(),
            temporal: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        side_state
            .nodes
            .get_mut(&root())
            .unwrap()
            .children
            .push(node.id.clone());
        side_state.nodes.insert(node.id.clone(), node);
        vcs.commit_graph_on(
            "maintenance/feedbeef",
            &side_state,
            CommitInput::new(
                "Maintenance: automatic enrichment (1 actions)",
                CommitSource::Maintenance {
                    job_id: Some("feedbeef".to_string()),
                },
            ),
        )
        .unwrap()
        .unwrap();

        // A turn is mid-flight: its tool calls mutated the live graph but
        // its end-of-turn commit has not run yet.
        let mid_turn = store
            .create_node(&root(), NodeType::Category, "MidTurn", None, None)
            .unwrap();

        let merged = vcs.merge_branch("maintenance/feedbeef").unwrap().unwrap();

        // The live graph holds both sides.
        let graph = store.graph();
        assert!(graph.nodes.contains_key(&NodeId::from("maint-node")));
        assert!(graph.nodes.contains_key(&mid_turn.id));
        assert!(graph.verify_invariants().is_empty());

        // The merge commit carries committed history only.
        let head_state = vcs.commit_info(&merged).unwrap().state;
        assert!(head_state.nodes.contains_key(&NodeId::from("maint-node")));
        assert!(!head_state.nodes.contains_key(&mid_turn.id));

        // The turn's own commit still lands its node under its own
        // attribution.
        let hash = vcs.commit(conversation_input()).unwrap().unwrap();
        let state = vcs.commit_info(&hash).unwrap().state;
        assert!(state.nodes.contains_key(&mid_turn.id));
        assert!(state.nodes.contains_key(&NodeId::from("maint-node")));
        assert!(state.verify_invariants().is_empty());
    }

    #[test]
    fn test_merge_conflicts_with_uncommitted_edit() {
        let (_dir, store, vcs) = fixture();
        vcs.init().unwrap();
        let shared = store
            .create_node(&root(), NodeType::Detail, "original", None, None)
            .unwrap();
        vcs.commit(conversation_input()).unwrap().unwrap();

        vcs.create_branch("side").unwrap();
        let mut side_state = store.graph();
        side_state.nodes.get_mut(&shared.id).unwrap().content = "side edit".to_string();
        vcs.commit_graph_on(
            "side",
            &side_state,
            CommitInput::new("side", CommitSource::Manual { tool_name: None }),
        )
        .unwrap()
        .unwrap();

        // Uncommitted live edit to the same node.
        store
            .update_node(&shared.id, Some("mid-turn edit"), None, None, None)
            .unwrap();

        let err = vcs.merge_branch("side").unwrap_err();
        assert!(matches!(err, VcsError::MergeConflict { .. }));
        // The live edit was not clobbered.
        assert_eq!(store.graph().nodes[&shared.id].content, "mid-turn edit");
    }

    #[test]
    fn test_commit_external_changes_reads_disk() {
        let (_dir, store, vcs) = fixture();
        vcs.init().unwrap();

        // A second store on the same snapshot stands in for a sub-agent
        // process writing out-of-band.
        let other = GraphStore::open(store.path()).unwrap();
        other
            .create_node(&root(), NodeType::Detail, "from child process", None, None)
            .unwrap();
        assert_eq!(store.graph().node_count(), 1);

        let hash = vcs
            .commit_external_changes(conversation_input())
            .unwrap()
            .unwrap();
        assert_eq!(store.graph().node_count(), 2);
        assert_eq!(vcs.head(DEFAULT_BRANCH).unwrap(), hash);
    }
}
