//! Crawlers: judgement passes over partitioned subtrees
//!
//! The graph's top-level categories are packed into at most eight tasks
//! (largest first, smallest combined) and each task gets its own sub-agent
//! scoped to those subtrees. Crawlers explore with `walk_graph`, receive
//! the pre-scan findings relevant to their slice, and report structured
//! findings of their own.

use crate::maintenance::findings::{parse_findings, renumber, Finding};
use willow_agent::{AbortHandle, AgentRunner, AgentSpec};
use willow_graph::{Graph, NodeId};
use willow_tools::AgentRole;

/// Upper bound on parallel crawler tasks
pub const MAX_CRAWLERS: usize = 8;

const CRAWLER_SYSTEM_PROMPT: &str = "\
You audit one slice of a personal knowledge graph. Explore your assigned\n\
subtrees with walk_graph and get_context; do not leave them. Look for\n\
duplicate nodes, contradictions, mislabelled or missing or redundant\n\
links, misplaced nodes, vague content, and overcrowded categories worth\n\
restructuring. Finish your reply with a JSON array of findings, each\n\
{\"id\":\"\",\"kind\":...,\"severity\":\"critical\"|\"warning\"|\"suggestion\",\n\
\"summary\":...,\"nodeIds\":[...],\"linkIds\":[...],\"suggestedAction\":...}.\n\
Report an empty array when the slice is healthy.";

/// One crawler's assignment
#[derive(Debug, Clone, PartialEq)]
pub struct CrawlerTask {
    /// 1-based task number, used in finding ids (`CRAWL-<n>-NNN`)
    pub number: usize,
    /// Top-level categories this crawler owns: (id, content)
    pub categories: Vec<(NodeId, String)>,
    /// Total nodes under those categories
    pub size: usize,
}

/// Partition the root's categories into at most `max` tasks. Categories
/// are placed largest-first onto the currently smallest task, so combined
/// tasks stay balanced.
pub fn partition(graph: &Graph, max: usize) -> Vec<CrawlerTask> {
    let root = match graph.nodes.get(&graph.root_id) {
        Some(root) => root,
        None => return Vec::new(),
    };
    let mut categories: Vec<(NodeId, String, usize)> = root
        .children
        .iter()
        .filter_map(|id| graph.nodes.get(id))
        .map(|node| {
            (
                node.id.clone(),
                node.content.clone(),
                graph.subtree_ids(&node.id).len(),
            )
        })
        .collect();
    if categories.is_empty() {
        return Vec::new();
    }
    categories.sort_by(|a, b| b.2.cmp(&a.2).then(a.0 .0.cmp(&b.0 .0)));

    let task_count = categories.len().min(max.max(1));
    let mut tasks: Vec<CrawlerTask> = (1..=task_count)
        .map(|number| CrawlerTask {
            number,
            categories: Vec::new(),
            size: 0,
        })
        .collect();
    for (id, content, size) in categories {
        let target = tasks
            .iter_mut()
            .min_by_key(|t| t.size)
            .expect("at least one task");
        target.categories.push((id, content));
        target.size += size;
    }
    tasks
}

/// Short orientation text included in every crawler prompt.
pub fn graph_summary(graph: &Graph) -> String {
    let root = &graph.nodes[&graph.root_id];
    let categories: Vec<String> = root
        .children
        .iter()
        .filter_map(|id| graph.nodes.get(id))
        .map(|n| format!("- {} ({})", n.content, n.id))
        .collect();
    format!(
        "{} nodes, {} links. Top-level categories:\n{}",
        graph.node_count(),
        graph.link_count(),
        categories.join("\n")
    )
}

/// Run one crawler and collect its findings. Failures yield an empty list.
pub async fn run_crawler(
    runner: &AgentRunner,
    task: &CrawlerTask,
    summary: &str,
    relevant_prescan: &[Finding],
    tool_endpoint: &str,
    job_id: &str,
    abort: &AbortHandle,
) -> Vec<Finding> {
    let subtrees: Vec<NodeId> = task.categories.iter().map(|(id, _)| id.clone()).collect();
    let role = AgentRole::Crawler {
        subtrees: subtrees.clone(),
    };

    let assigned: Vec<String> = task
        .categories
        .iter()
        .map(|(id, content)| format!("- {content} ({id})"))
        .collect();
    let prescan_text = if relevant_prescan.is_empty() {
        "none".to_string()
    } else {
        serde_json::to_string_pretty(relevant_prescan).unwrap_or_else(|_| "none".to_string())
    };
    let prompt = format!(
        "Graph overview:\n{summary}\n\nYour subtrees:\n{}\n\nPre-scan findings for your slice:\n{prescan_text}",
        assigned.join("\n")
    );

    let mut spec = AgentSpec::new(format!("crawler-{}", task.number), prompt);
    spec.system_prompt = CRAWLER_SYSTEM_PROMPT.to_string();
    spec.disallowed_tools = role
        .disallowed_tools()
        .into_iter()
        .map(String::from)
        .collect();
    spec.tool_endpoint = format!(
        "{tool_endpoint}?role=crawler&job={job_id}&subtrees={}",
        subtrees
            .iter()
            .map(|s| s.0.as_str())
            .collect::<Vec<_>>()
            .join(",")
    );

    let (emitter, mut rx) = willow_stream::EventEmitter::channel();
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let outcome = runner.run(&spec, &emitter, abort).await;
    drop(emitter);
    let _ = drain.await;

    let mut findings = parse_findings(&outcome.text);
    renumber(&mut findings, &format!("CRAWL-{}", task.number));
    tracing::info!(
        crawler = task.number,
        findings = findings.len(),
        "Crawler finished"
    );
    findings
}

/// The pre-scan findings that touch any node in the task's subtrees.
pub fn relevant_findings<'a>(
    graph: &Graph,
    task: &CrawlerTask,
    prescan: &'a [Finding],
) -> Vec<&'a Finding> {
    prescan
        .iter()
        .filter(|finding| {
            finding.node_ids.iter().any(|node| {
                task.categories
                    .iter()
                    .any(|(subtree, _)| graph.is_within(node, subtree))
            })
        })
        .collect()
}
