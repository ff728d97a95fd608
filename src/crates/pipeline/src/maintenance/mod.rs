//! The enrichment pipeline: background maintenance on a side branch
//!
//! Triggered manually or after enough conversations, a maintenance job
//! audits and repairs the graph without disturbing in-flight turns. The
//! job works on an isolated workspace copy of the snapshot and commits the
//! result to a `maintenance/<jobid8>` branch; a disjoint merge lands it
//! back on the original branch, and a conflicting one leaves it parked on
//! the side branch. At most one job runs at a time.

pub mod crawler;
pub mod findings;
pub mod prescan;
pub mod resolver;

use crate::error::{PipelineError, Result};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use willow_agent::{AbortHandle, AgentRunner};
use willow_graph::{snapshot, GraphStore};
use willow_vcs::{CommitInput, CommitSource, Vcs, VcsError, MAINTENANCE_PREFIX};

use crawler::{graph_summary, partition, relevant_findings, run_crawler, MAX_CRAWLERS};
use findings::Finding;
use prescan::prescan;
use resolver::run_resolver;

/// Tuning knobs for the maintenance manager
#[derive(Debug, Clone)]
pub struct MaintenanceOptions {
    /// Conversations between automatic runs
    pub threshold: u32,
    /// Pause between the triggering conversation and the run
    pub delay: Duration,
    /// Crawler task cap
    pub max_crawlers: usize,
}

impl Default for MaintenanceOptions {
    fn default() -> MaintenanceOptions {
        MaintenanceOptions {
            threshold: 5,
            delay: Duration::from_secs(15),
            max_crawlers: MAX_CRAWLERS,
        }
    }
}

/// What kicked a job off
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Trigger {
    Manual,
    Automatic,
}

impl Trigger {
    pub fn label(&self) -> &'static str {
        match self {
            Trigger::Manual => "manual",
            Trigger::Automatic => "automatic",
        }
    }
}

/// Live job status published on the progress callback
#[derive(Debug, Clone, Serialize)]
pub struct MaintenanceProgress {
    pub job_id: String,
    pub phase: String,
    pub crawlers_total: usize,
    pub crawlers_done: usize,
    pub findings: usize,
    pub actions: usize,
}

pub type ProgressFn = Arc<dyn Fn(MaintenanceProgress) + Send + Sync>;

/// Owns the single-flight slot, the conversation counter, and job state
pub struct MaintenanceManager {
    store: Arc<GraphStore>,
    vcs: Arc<Vcs>,
    runner: AgentRunner,
    tool_endpoint: String,
    options: MaintenanceOptions,
    running: Mutex<Option<String>>,
    conversations_since: AtomicU32,
    workspace: Mutex<Option<Arc<GraphStore>>>,
    progress_handler: Mutex<Option<ProgressFn>>,
    last_progress: Mutex<Option<MaintenanceProgress>>,
    abort: AbortHandle,
}

impl MaintenanceManager {
    pub fn new(
        store: Arc<GraphStore>,
        vcs: Arc<Vcs>,
        runner: AgentRunner,
        tool_endpoint: impl Into<String>,
        options: MaintenanceOptions,
    ) -> Arc<MaintenanceManager> {
        Arc::new(MaintenanceManager {
            store,
            vcs,
            runner,
            tool_endpoint: tool_endpoint.into(),
            options,
            running: Mutex::new(None),
            conversations_since: AtomicU32::new(0),
            workspace: Mutex::new(None),
            progress_handler: Mutex::new(None),
            last_progress: Mutex::new(None),
            abort: AbortHandle::new(),
        })
    }

    /// Register the progress callback (replacing any previous one).
    pub fn on_progress(&self, f: impl Fn(MaintenanceProgress) + Send + Sync + 'static) {
        *self.progress_handler.lock() = Some(Arc::new(f));
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Most recent progress report, if any job has run.
    pub fn status(&self) -> Option<MaintenanceProgress> {
        self.last_progress.lock().clone()
    }

    /// The store maintenance sub-agents operate on while a job runs. The
    /// tool endpoint routes crawler and resolver calls here, which is what
    /// isolates their mutations from the conversation branch.
    pub fn maintenance_store(&self) -> Option<Arc<GraphStore>> {
        self.workspace.lock().clone()
    }

    /// Abort the in-flight job's sub-agents, if any.
    pub fn abort(&self) {
        self.abort.abort();
    }

    /// Count one finished conversation; schedules an automatic run when
    /// the threshold is reached.
    pub fn record_conversation(self: &Arc<Self>) {
        let count = self.conversations_since.fetch_add(1, Ordering::SeqCst) + 1;
        if count < self.options.threshold {
            return;
        }
        self.conversations_since.store(0, Ordering::SeqCst);
        let manager = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(manager.options.delay).await;
            if manager.clone().run(Trigger::Automatic).is_none() {
                tracing::debug!("Automatic maintenance skipped; a job is already running");
            }
        });
    }

    /// Start a job. Returns its id, or `None` when one is already in
    /// flight.
    pub fn run(self: Arc<Self>, trigger: Trigger) -> Option<String> {
        let job_id = Uuid::new_v4().simple().to_string();
        {
            let mut running = self.running.lock();
            if let Some(current) = running.as_ref() {
                tracing::info!(current = %current, "Maintenance already in flight");
                return None;
            }
            *running = Some(job_id.clone());
        }

        let manager = self.clone();
        let id = job_id.clone();
        tokio::spawn(async move {
            let result = manager.execute(&id, trigger).await;
            if let Err(e) = result {
                tracing::warn!(job = %id, error = %e, "Maintenance job failed");
                manager.cleanup_failed(&id);
                manager.publish(MaintenanceProgress {
                    job_id: id.clone(),
                    phase: "failed".to_string(),
                    crawlers_total: 0,
                    crawlers_done: 0,
                    findings: 0,
                    actions: 0,
                });
            }
            *manager.workspace.lock() = None;
            let _ = std::fs::remove_file(manager.workspace_path(&id));
            *manager.running.lock() = None;
        });
        Some(job_id)
    }

    fn workspace_path(&self, job_id: &str) -> PathBuf {
        let dir = self
            .store
            .path()
            .parent()
            .unwrap_or_else(|| std::path::Path::new("."));
        dir.join(format!("maintenance-{}.json", &job_id[..8.min(job_id.len())]))
    }

    fn branch_name(job_id: &str) -> String {
        format!("{}{}", MAINTENANCE_PREFIX, &job_id[..8.min(job_id.len())])
    }

    fn publish(&self, progress: MaintenanceProgress) {
        *self.last_progress.lock() = Some(progress.clone());
        if let Some(handler) = self.progress_handler.lock().as_ref() {
            handler(progress);
        }
    }

    async fn execute(self: &Arc<Self>, job_id: &str, trigger: Trigger) -> Result<()> {
        tracing::info!(job = job_id, trigger = trigger.label(), "Maintenance started");
        self.vcs.init()?;
        let original_branch = self.vcs.current_branch()?;
        let branch = Self::branch_name(job_id);
        self.vcs.create_branch(&branch)?;

        // The job's working copy: the snapshot as it is on disk right now.
        let disk_graph = snapshot::load(self.store.path())?;
        let workspace_path = self.workspace_path(job_id);
        snapshot::save(&workspace_path, &disk_graph)?;
        let workspace = Arc::new(GraphStore::open(&workspace_path)?);
        *self.workspace.lock() = Some(workspace.clone());

        let mut progress = MaintenanceProgress {
            job_id: job_id.to_string(),
            phase: "pre-scan".to_string(),
            crawlers_total: 0,
            crawlers_done: 0,
            findings: 0,
            actions: 0,
        };
        self.publish(progress.clone());

        let graph = workspace.graph();
        let pre = prescan(&graph, Utc::now());
        progress.findings = pre.len();

        let tasks = partition(&graph, self.options.max_crawlers);
        progress.phase = "crawling".to_string();
        progress.crawlers_total = tasks.len();
        self.publish(progress.clone());

        let summary = graph_summary(&graph);
        let done = Arc::new(AtomicU32::new(0));
        let crawler_runs = tasks.iter().map(|task| {
            let relevant: Vec<Finding> = relevant_findings(&graph, task, &pre)
                .into_iter()
                .cloned()
                .collect();
            let done = done.clone();
            let manager = self.clone();
            let mut progress = progress.clone();
            let summary = summary.clone();
            async move {
                let found = run_crawler(
                    &manager.runner,
                    task,
                    &summary,
                    &relevant,
                    &manager.tool_endpoint,
                    &progress.job_id,
                    &manager.abort,
                )
                .await;
                progress.crawlers_done = done.fetch_add(1, Ordering::SeqCst) as usize + 1;
                progress.findings += found.len();
                manager.publish(progress);
                found
            }
        });
        let crawler_findings: Vec<Finding> = futures::future::join_all(crawler_runs)
            .await
            .into_iter()
            .flatten()
            .collect();

        let mut all_findings = pre;
        all_findings.extend(crawler_findings);
        progress.crawlers_done = tasks.len();
        progress.findings = all_findings.len();

        let mut actions = 0;
        if !all_findings.is_empty() {
            progress.phase = "resolving".to_string();
            self.publish(progress.clone());
            actions = run_resolver(
                &self.runner,
                &all_findings,
                &self.tool_endpoint,
                job_id,
                &self.abort,
            )
            .await;
            progress.actions = actions;
        }

        progress.phase = "committing".to_string();
        self.publish(progress.clone());

        // Pick up anything the resolver process wrote to the workspace
        // snapshot out-of-band, then land the state on the side branch.
        workspace.reload()?;
        let message = format!(
            "Maintenance: {} enrichment ({} actions)",
            trigger.label(),
            actions
        );
        let committed = self.vcs.commit_graph_on(
            &branch,
            &workspace.graph(),
            CommitInput::new(
                message,
                CommitSource::Maintenance {
                    job_id: Some(job_id.to_string()),
                },
            ),
        )?;

        match committed {
            Some(_) => match self.vcs.merge_branch(&branch) {
                Ok(_) => {
                    if let Err(e) = self.vcs.delete_branch(&branch) {
                        tracing::warn!(branch = %branch, error = %e, "Branch cleanup failed");
                    }
                    tracing::info!(job = job_id, "Maintenance merged into {original_branch}");
                }
                Err(VcsError::MergeConflict { .. }) => {
                    tracing::warn!(
                        job = job_id,
                        branch = %branch,
                        "Merge conflicted; changes remain on the side branch"
                    );
                }
                Err(e) => return Err(PipelineError::Vcs(e)),
            },
            None => {
                // Nothing changed; the empty branch is just noise.
                if let Err(e) = self.vcs.delete_branch(&branch) {
                    tracing::warn!(branch = %branch, error = %e, "Branch cleanup failed");
                }
            }
        }

        progress.phase = "complete".to_string();
        self.publish(progress);
        tracing::info!(job = job_id, "Maintenance finished");
        Ok(())
    }

    /// Failure cleanup: drop the workspace and the side branch; the
    /// conversation branch was never touched.
    fn cleanup_failed(&self, job_id: &str) {
        let branch = Self::branch_name(job_id);
        match self.vcs.delete_branch(&branch) {
            Ok(()) | Err(VcsError::BranchNotFound(_)) => {}
            Err(e) => {
                tracing::warn!(branch = %branch, error = %e, "Failed-job branch cleanup failed")
            }
        }
    }
}
