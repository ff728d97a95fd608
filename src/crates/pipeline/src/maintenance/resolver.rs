//! The resolver: executes the safe subset of suggested actions
//!
//! One sub-agent with full mutation authority receives every finding from
//! the pre-scan and the crawlers. It judges which suggested actions are
//! safe and performs them through the mutation tools; anything doubtful is
//! left alone. The number of mutating tool calls it made is the job's
//! action count.

use crate::maintenance::findings::Finding;
use willow_agent::{AbortHandle, AgentRunner, AgentSpec};
use willow_tools::{schema, AgentRole};

const RESOLVER_SYSTEM_PROMPT: &str = "\
You repair a personal knowledge graph. You receive findings gathered by an\n\
integrity scan and by crawler agents, each with a suggested action. Execute\n\
the actions you judge safe using the mutation tools; verify targets with\n\
get_context or search_nodes first. Skip anything ambiguous, and never\n\
delete content you cannot confirm is redundant or broken. Work through the\n\
findings from critical to suggestion.";

/// Run the resolver over `findings`. Returns how many mutations it made.
pub async fn run_resolver(
    runner: &AgentRunner,
    findings: &[Finding],
    tool_endpoint: &str,
    job_id: &str,
    abort: &AbortHandle,
) -> usize {
    let findings_json =
        serde_json::to_string_pretty(findings).unwrap_or_else(|_| "[]".to_string());
    let mut spec = AgentSpec::new(
        "resolver",
        format!("Findings to resolve:\n{findings_json}"),
    );
    spec.system_prompt = RESOLVER_SYSTEM_PROMPT.to_string();
    spec.disallowed_tools = AgentRole::Resolver
        .disallowed_tools()
        .into_iter()
        .map(String::from)
        .collect();
    spec.tool_endpoint = format!("{tool_endpoint}?role=resolver&job={job_id}");

    let (emitter, mut rx) = willow_stream::EventEmitter::channel();
    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let outcome = runner.run(&spec, &emitter, abort).await;
    drop(emitter);
    let _ = drain.await;

    let mutating: Vec<&str> = schema::mutating_tools();
    let actions = outcome
        .tool_calls
        .iter()
        .filter(|call| mutating.contains(&call.name.as_str()))
        .count();
    tracing::info!(job = job_id, actions, "Resolver finished");
    actions
}
