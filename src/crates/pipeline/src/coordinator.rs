//! The coordinator tool: `search_memories`
//!
//! The chat agent sees one memory tool. Behind it, the parent spawns a
//! search sub-agent that navigates the graph with `walk_graph` and
//! assembles context. The search agent's tool events travel over the
//! turn's bus socket onto the user's stream, bracketed by `search_phase`
//! markers. A failing search simply yields empty context.

use crate::registry::TurnRegistry;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use willow_agent::{AbortHandle, AgentRunner, AgentSpec, BusClient, BusEnvelope};
use willow_stream::{EventEmitter, PhaseMark, StreamEvent};
use willow_tools::AgentRole;

const SEARCH_SYSTEM_PROMPT: &str = "\
You navigate a personal knowledge graph to find memories relevant to a query.\n\
Start at the root with walk_graph {\"action\":\"start\"}, descend into promising\n\
branches with {\"action\":\"down\"}, follow cross-links when they look relevant,\n\
and stop with {\"action\":\"done\"} once you have what you need. Use search_nodes\n\
for direct lookups and get_context to flesh out a hit. Reply with only the\n\
relevant facts, one per line. Reply with an empty message when nothing fits.";

/// Spawns search sub-agents on behalf of the chat agent
pub struct Coordinator {
    runner: AgentRunner,
    registry: Arc<TurnRegistry>,
    tool_endpoint: String,
}

impl Coordinator {
    pub fn new(
        runner: AgentRunner,
        registry: Arc<TurnRegistry>,
        tool_endpoint: impl Into<String>,
    ) -> Coordinator {
        Coordinator {
            runner,
            registry,
            tool_endpoint: tool_endpoint.into(),
        }
    }

    /// Handle one `search_memories(query)` call for a conversation's turn.
    /// Returns the `<memory_context>` block handed back to the chat agent.
    pub async fn search_memories(&self, conversation_id: &str, query: &str) -> String {
        let context = self.registry.get(conversation_id);
        let abort = context
            .as_ref()
            .map(|c| c.abort.clone())
            .unwrap_or_default();

        let (emitter, rx) = EventEmitter::channel();
        let forward = context
            .as_ref()
            .map(|c| tokio::spawn(forward_to_bus(c.bus_path.clone(), rx)));

        emitter.emit(StreamEvent::SearchPhase {
            status: PhaseMark::Start,
        });

        let mut spec = AgentSpec::new("search", format!("Find memories relevant to: {query}"));
        spec.system_prompt = SEARCH_SYSTEM_PROMPT.to_string();
        spec.disallowed_tools = AgentRole::Search
            .disallowed_tools()
            .into_iter()
            .map(String::from)
            .collect();
        spec.tool_endpoint = format!("{}?role=search", self.tool_endpoint);

        let outcome = self.runner.run(&spec, &emitter, &abort).await;

        emitter.emit(StreamEvent::SearchPhase {
            status: PhaseMark::End,
        });
        drop(emitter);
        if let Some(forward) = forward {
            let _ = forward.await;
        }

        tracing::info!(
            conversation = conversation_id,
            chars = outcome.text.len(),
            "Memory search finished"
        );
        format!("<memory_context>\n{}\n</memory_context>", outcome.text.trim())
    }
}

/// Drain an emitter into the turn's bus socket. When the socket is gone
/// the events are dropped; search still completes.
async fn forward_to_bus(path: PathBuf, mut rx: mpsc::UnboundedReceiver<StreamEvent>) {
    let mut client = match BusClient::connect(&path).await {
        Ok(client) => Some(client),
        Err(e) => {
            tracing::warn!(error = %e, "Bus connect failed; search events will be dropped");
            None
        }
    };
    while let Some(event) = rx.recv().await {
        if let Some(client) = client.as_mut() {
            let envelope = BusEnvelope {
                event: event.name().to_string(),
                data: event.data(),
            };
            if client.send(&envelope).await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TurnContext;
    use willow_agent::{AgentCommand, EventBus};

    fn shell_runner(script: &str) -> AgentRunner {
        AgentRunner::new(AgentCommand {
            program: "/bin/sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
        })
    }

    #[tokio::test]
    async fn test_search_events_bracketed_and_bused() {
        let bus = EventBus::bind().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.on_event(move |envelope| {
            let _ = tx.send(envelope);
        });

        let registry = Arc::new(TurnRegistry::new());
        registry.register(
            "c1",
            TurnContext {
                bus_path: bus.path().to_path_buf(),
                abort: AbortHandle::new(),
            },
        );

        let script = concat!(
            r#"echo '{"type":"content_block_start","index":0,"content_block":{"type":"text","text":"Acme Corp 2020-2023"}}'; "#,
            r#"echo '{"type":"content_block_stop","index":0}'"#,
        );
        let coordinator = Coordinator::new(shell_runner(script), registry, "http://x/api/tools/call");
        let context = coordinator.search_memories("c1", "where did I work").await;
        assert!(context.starts_with("<memory_context>"));
        assert!(context.contains("Acme Corp"));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event, "search_phase");
        assert_eq!(first.data["status"], "start");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event, "content");
        let third = rx.recv().await.unwrap();
        assert_eq!(third.event, "search_phase");
        assert_eq!(third.data["status"], "end");
    }

    #[tokio::test]
    async fn test_failed_search_yields_empty_context() {
        let registry = Arc::new(TurnRegistry::new());
        let coordinator = Coordinator::new(
            AgentRunner::new(AgentCommand {
                program: "/nonexistent/binary".to_string(),
                args: vec![],
            }),
            registry,
            "http://x/api/tools/call",
        );
        let context = coordinator.search_memories("c-unknown", "anything").await;
        assert_eq!(context, "<memory_context>\n\n</memory_context>");
    }
}
