//! Commit records and content addressing
//!
//! A commit embeds the full graph state it captured, its parent hash, and
//! an attribution describing who produced it (a conversation turn, a
//! maintenance job, a manual tool call, or a merge). Hashes are computed
//! over a canonical JSON rendering, so identical content hashes identically
//! regardless of in-memory map order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use willow_graph::Graph;

/// Content hash identifying a commit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitHash(pub String);

impl fmt::Display for CommitHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl CommitHash {
    /// The abbreviated form used in logs and branch names
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(8)]
    }
}

/// Who produced a commit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommitSource {
    /// Written at the end of a user turn
    Conversation {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        conversation_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    /// Written by the enrichment pipeline
    Maintenance {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_id: Option<String>,
    },
    /// Written by a direct tool invocation
    Manual {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tool_name: Option<String>,
    },
    /// Produced by merging another branch
    Merge { source_branch: String },
}

impl CommitSource {
    pub fn label(&self) -> &'static str {
        match self {
            CommitSource::Conversation { .. } => "conversation",
            CommitSource::Maintenance { .. } => "maintenance",
            CommitSource::Manual { .. } => "manual",
            CommitSource::Merge { .. } => "merge",
        }
    }
}

/// Input for creating a commit
#[derive(Debug, Clone)]
pub struct CommitInput {
    pub message: String,
    pub source: CommitSource,
}

impl CommitInput {
    pub fn new(message: impl Into<String>, source: CommitSource) -> Self {
        CommitInput {
            message: message.into(),
            source,
        }
    }
}

/// A commit: attribution plus the full captured state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commit {
    pub hash: CommitHash,
    pub parent: Option<CommitHash>,
    pub message: String,
    pub source: CommitSource,
    pub timestamp: DateTime<Utc>,
    pub state: Graph,
}

/// Canonical JSON for hashing: round-tripping through `serde_json::Value`
/// sorts object keys, so map iteration order cannot leak into the hash.
pub fn canonical_json(graph: &Graph) -> serde_json::Result<String> {
    let value = serde_json::to_value(graph)?;
    serde_json::to_string(&value)
}

/// Compute the content hash for a commit-to-be.
pub fn compute_hash(
    parent: Option<&CommitHash>,
    message: &str,
    timestamp: DateTime<Utc>,
    canonical_state: &str,
) -> CommitHash {
    let mut hasher = Sha256::new();
    hasher.update(parent.map(|p| p.0.as_str()).unwrap_or(""));
    hasher.update(b"\n");
    hasher.update(message.as_bytes());
    hasher.update(b"\n");
    hasher.update(timestamp.to_rfc3339().as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_state.as_bytes());
    let digest = hasher.finalize();
    CommitHash(digest.iter().map(|b| format!("{b:02x}")).collect())
}
