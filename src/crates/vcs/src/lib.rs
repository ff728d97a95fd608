//! willow-vcs: branches, commits, and merges over the graph snapshot
//!
//! Commits are content-addressed and chained per branch; each carries an
//! attribution tuple naming the conversation turn, maintenance job, or
//! manual tool call that produced it. `commit_external_changes` is the key
//! primitive: it re-reads the snapshot that a sub-agent process may have
//! rewritten and commits the delta against the branch head.

pub mod commit;
pub mod error;
pub mod repo;

pub use commit::{Commit, CommitHash, CommitInput, CommitSource};
pub use error::{Result, VcsError};
pub use repo::{diff, ChangeSet, Vcs, DEFAULT_BRANCH, MAINTENANCE_PREFIX};
