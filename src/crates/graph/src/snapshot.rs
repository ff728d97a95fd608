//! On-disk snapshot handling
//!
//! The snapshot is the single JSON file shared between the parent process
//! and sub-agent processes. Writes go through a temp file in the same
//! directory followed by a rename, so readers never observe a torn file.

use crate::error::{GraphError, Result};
use crate::model::Graph;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Environment variable overriding the snapshot location
pub const GRAPH_PATH_ENV: &str = "WILLOW_GRAPH_PATH";

/// Resolve the snapshot path: `$WILLOW_GRAPH_PATH`, else
/// `$HOME/.willow/graph.json`.
pub fn default_path() -> PathBuf {
    if let Ok(path) = std::env::var(GRAPH_PATH_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }
    let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
    home.join(".willow").join("graph.json")
}

/// Load a graph from `path`. A file that parses but lacks its root node is
/// treated as corrupt; per the error policy the store then refuses to
/// mutate while serving reads from memory.
pub fn load(path: &Path) -> Result<Graph> {
    let raw = std::fs::read_to_string(path)?;
    let graph: Graph = serde_json::from_str(&raw).map_err(|e| GraphError::CorruptSnapshot {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    if !graph.nodes.contains_key(&graph.root_id) {
        return Err(GraphError::CorruptSnapshot {
            path: path.display().to_string(),
            reason: format!("root node '{}' missing from node map", graph.root_id),
        });
    }
    Ok(graph)
}

/// Write a graph to `path` atomically (temp file + rename).
pub fn save(path: &Path, graph: &Graph) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let json = serde_json::to_string_pretty(graph)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(json.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| GraphError::Io(e.error))?;

    tracing::debug!(
        path = %path.display(),
        nodes = graph.node_count(),
        links = graph.link_count(),
        "Snapshot written"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");

        let graph = Graph::new();
        save(&path, &graph).unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded, graph);
    }

    #[test]
    fn test_load_rejects_rootless_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{"root_id":"root","nodes":{},"links":{}}"#,
        )
        .unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, GraphError::CorruptSnapshot { .. }));
    }

    #[test]
    fn test_load_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(&path, "{not json").unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, GraphError::CorruptSnapshot { .. }));
    }
}
