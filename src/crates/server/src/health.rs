//! Health reporting
//!
//! One endpoint summarizing the engine: graph size, current branch,
//! stream and maintenance activity. Degraded means reads work but the
//! version-control layer is unusable (mutations would refuse).

use crate::state::AppState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub nodes: usize,
    pub links: usize,
    pub branch: Option<String>,
    pub active_streams: usize,
    pub maintenance_running: bool,
}

pub fn report(state: &AppState) -> HealthReport {
    let (nodes, links) = state
        .store
        .with_graph(|g| (g.node_count(), g.link_count()));
    let branch = state.vcs.current_branch().ok();
    HealthReport {
        status: if branch.is_some() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Degraded
        },
        nodes,
        links,
        branch,
        active_streams: state.streams.active_count(),
        maintenance_running: state.maintenance.is_running(),
    }
}
